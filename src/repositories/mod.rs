pub(crate) mod checklists;
pub(crate) mod enrollments;
pub(crate) mod final_exams;
pub(crate) mod partials;
pub(crate) mod practices;
pub(crate) mod quizzes;
pub(crate) mod simulations;
pub(crate) mod templates;
pub(crate) mod theories;
