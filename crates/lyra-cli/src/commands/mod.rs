pub mod common;
pub mod like;
pub mod search;
pub mod setting;
pub mod status;
pub mod storage;
pub mod sync;
pub mod view;
