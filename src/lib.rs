pub mod agent;
pub mod console;
pub mod context;
pub mod model;
pub mod protocol;
pub mod tools;
pub mod validation;
