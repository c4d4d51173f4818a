//! Tool execution for BoltStudio.
//!
//! The [`ToolDispatcher`] turns a parsed tool directive into text by acting
//! on two collaborators: a [`Sandbox`](boltstudio_core::Sandbox) for commands
//! and files, and a [`WebProxy`](boltstudio_core::WebProxy) for outbound
//! HTTP. [`LocalSandbox`] and [`HttpProxy`] are the implementations used by
//! the command-line front-end.

pub mod dispatcher;
pub mod local_sandbox;
pub mod proxy;
pub mod text;

pub use dispatcher::{ToolDispatcher, ToolLimits};
pub use local_sandbox::LocalSandbox;
pub use proxy::HttpProxy;
