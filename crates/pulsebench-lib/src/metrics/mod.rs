pub mod accuracy;
pub mod epochs;
pub mod matching;
pub mod ptt;
pub mod rate;
