//! Fuzz testing for the record decoders.
//!
//! Consumers decode whatever arrives on the log, so both layers must reject
//! arbitrary bytes with an error instead of panicking:
//!
//! - `log_client::envelope::decode`: the broker message framing
//! - `codec::decode`: the order command inside it
//! - `validation::validate_broker_address`: addresses read from the environment
//!
//! # Running the Fuzz Tests
//!
//! ```bash
//! cargo +nightly install cargo-fuzz
//! cargo +nightly fuzz run fuzz_decode -- -max_total_time=60
//! ```

#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use order_pipeline::codec;
use order_pipeline::log_client::envelope;
use order_pipeline::validation::validate_broker_address;

fuzz_target!(|data: &[u8]| {
    if let Ok(frame) = envelope::decode(Bytes::copy_from_slice(data)) {
        let _ = codec::decode(&frame.value);
    }

    let _ = codec::decode(data);

    if let Ok(s) = std::str::from_utf8(data) {
        let _ = validate_broker_address(s);
    }
});
