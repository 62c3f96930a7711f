pub mod init;
pub mod report;
pub mod score_bts;
pub mod simulate;
pub mod validate;
