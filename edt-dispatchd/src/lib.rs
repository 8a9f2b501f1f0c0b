//! The emergency dispatch daemon's core: twin pool, intent arbitration
//! table, assignment engine, simulation barrier, worker lifecycle, ingress
//! dispatcher, and message bus. Exposed as a library so integration tests
//! under `tests/` can exercise full emergency lifecycles the same way
//! `edt-dispatchd::main` wires them.

#![forbid(unsafe_code)]

pub mod assignment;
pub mod barrier;
pub mod bus;
pub mod ingress;
pub mod intent;
pub mod twins;
pub mod worker;
