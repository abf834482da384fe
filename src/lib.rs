// Library root
// ------------
// The `pinpoint` binary (`main.rs`) is a thin shell over these modules.
//
// Module responsibilities:
// - `ignore`, `walker`, `archive`: pick the project files to deploy and zip
//   them into a temporary archive.
// - `credentials`: saved login sessions in `~/.pinpoint.json`.
// - `api`, `retry`, `identity`: HTTP calls to the Pinpoint API.
// - `project`: reads `pinpoint.config.js`.
// - `context`: per-invocation settings and caches handed to every command.
// - `deploy`, `account`: the commands themselves.
// - `ui`: spinners, progress bars and prompts.
pub mod account;
pub mod api;
pub mod archive;
pub mod context;
pub mod credentials;
pub mod deploy;
pub mod error;
pub mod identity;
pub mod ignore;
pub mod project;
pub mod retry;
pub mod ui;
pub mod walker;

pub use context::{Context, Settings};
pub use error::{PinpointError, Result};
