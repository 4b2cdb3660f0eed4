pub mod git;
pub mod logging;
pub mod url;
