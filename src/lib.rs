pub mod config;
pub mod error;
pub mod grid;
pub mod logging;
pub mod ncout;
pub mod odict;
pub mod pipeline;
pub mod precip;
pub mod stdfile;
pub mod test_utils;
pub mod utils;
