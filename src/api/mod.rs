pub(crate) mod class_exams;
pub(crate) mod errors;
pub(crate) mod final_exams;
pub(crate) mod guards;
pub(crate) mod handlers;
pub(crate) mod partials;
pub(crate) mod router;
