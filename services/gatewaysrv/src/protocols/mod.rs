//! Device protocol stacks
//!
//! Pure frame builders and parsers; no I/O. Drivers pair a stack with a
//! transport.

pub mod mitsubishi;
pub mod modbus;
pub mod siemens;
