//! Functional core for gemproxy.
//!
//! Everything in this crate is pure: wire types, model mapping, prompt
//! preparation, conversation hashing, Gemini protocol encoding/decoding, pool
//! policy and the storage contract. I/O lives in `gemproxy_webapi` and the
//! `gemproxy` server.

pub mod conversation;
pub mod gemini;
pub mod model;
pub mod openai;
pub mod pool;
pub mod session;
pub mod storage;
