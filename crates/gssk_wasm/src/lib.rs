//! JavaScript bindings for the GSSK kernel.

pub mod forecast;
pub mod system;

pub use forecast::WasmEnsembleResult;
pub use system::WasmInstance;
