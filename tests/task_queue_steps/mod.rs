//! Step definitions for task queue BDD scenarios.


mod then;
mod when;
