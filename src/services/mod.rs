pub(crate) mod aggregation;
pub(crate) mod class_setup;
pub(crate) mod errors;
pub(crate) mod exam_codes;
pub(crate) mod exam_views;
pub(crate) mod grading;
pub(crate) mod lifecycle;
pub(crate) mod partial_detail;
pub(crate) mod provisioning;
pub(crate) mod quiz_content;
pub(crate) mod simulation_tasks;
