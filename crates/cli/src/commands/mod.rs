pub mod check;
pub mod once;
pub mod run;
pub mod schema;
