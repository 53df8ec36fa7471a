//! Shadercap Session Model
//!
//! Defines the core data contracts shared by the driver, the capture engine,
//! and the encoder:
//! - **Settings:** Immutable export snapshot and the settings store seam
//! - **Session:** Export lifecycle state and frame/write counters
//! - **Shader:** The currently loaded render target and its id
//! - **Message:** Tagged messages posted by scripts running in the render surface
//! - **Notify:** Lifecycle notifications published to the UI layer

pub mod message;
pub mod notify;
pub mod session;
pub mod settings;
pub mod shader;

pub use message::*;
pub use notify::*;
pub use session::*;
pub use settings::*;
pub use shader::*;
