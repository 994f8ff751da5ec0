#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut bytes = BytesMut::from(data);
    let _ = remiro::resp::frame::parse_command(&mut bytes);
});
