//! pipexec - runs a compiled CI pipeline inside containers
//!
//! ## Commands
//!
//! - `pipexec exec` - Run the build described by a JSON payload
//! - `pipexec check` - Compile a payload and list its steps
//!
//! ## Quick Start
//!
//! ```bash
//! # Run every stage
//! pipexec exec payload.json
//!
//! # Clone and build only
//! cat payload.json | pipexec exec --clone --build
//! ```

use std::process::ExitCode;

mod cli;

fn main() -> ExitCode {
    match cli::run() {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(e) => {
            eprintln!("Error: {e}");
            if std::env::var("PIPEXEC_VERBOSE").is_ok() {
                eprintln!("{e:?}");
            }
            ExitCode::FAILURE
        }
    }
}
