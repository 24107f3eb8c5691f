// Tests module
// Session flow: handshake gating, RPC calls and discovery over a loopback transport

pub mod session_flow;
