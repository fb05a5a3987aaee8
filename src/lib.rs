//! Provision a small distributed object-storage cluster over SSH and talk
//! to it through whichever node answers first.

pub mod backend;
pub mod cli;
pub mod deploy;
pub mod error;
pub mod remote;
pub mod storage;
pub mod topology;

pub use deploy::{BootstrapReport, Deployer, FailoverClient};
pub use error::{DeployError, Result};
