#![no_main]

use libfuzzer_sys::fuzz_target;
use rpc_protocol::core::packet::Packet;
use rpc_protocol::core::serialization;
use rpc_protocol::protocol::message::Response;

fuzz_target!(|data: &[u8]| {
    // Header parsing and payload decoding must never panic
    if let Ok(packet) = Packet::from_bytes(data) {
        if let Ok(value) = serialization::decode(&packet.payload) {
            let _ = Response::from_value(value);
        }
    }
});
