pub mod action;
pub mod conversation;
pub mod gate;
pub mod outcome;
pub mod run;
