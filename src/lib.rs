//! Client-side helper for managed macOS machines.
//!
//! Probes local identity and enrollment state, and drives the management
//! agent and the dialog helper through validated command lines.

pub mod agent;
pub mod config;
pub mod error;
pub mod helper;
pub mod privilege;
pub mod probe;
pub mod runner;
pub mod server;

pub use agent::{Agent, AgentArgs, AgentCommand, ROOTLESS_COMMANDS};
pub use config::Config;
pub use error::{ClientError, Result};
pub use helper::{
    compile_helper_args, DialogHelper, DialogOptions, HelperExit, HelperRequest,
    UnknownOptionPolicy, WindowType,
};
pub use privilege::{EffectiveUser, FixedPrivilege, PrivilegeChecker};
pub use probe::{EnvironmentProbe, MachineIdentity};
pub use runner::{CommandOutput, CommandRunner, ExecutionResult, SystemRunner};
pub use server::{ServerResolver, ServerUrl};
