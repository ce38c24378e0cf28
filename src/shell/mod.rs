// Composition root for the self-registration backend.
//
// Responsibilities
// - Read config from the environment and command-line arguments.
// - Build the application context from an explicit registration list.
// - Serve the HTTP router and drive the process lifecycle until shutdown.

pub mod actuator;
pub mod config;
pub mod context;
pub mod errors;
pub mod http;
pub mod server;
pub mod state;
pub mod telemetry;
