#![no_main]

use bytes::BytesMut;
use diag_engine::core::codec::{ClientCodec, ServerCodec};
use libfuzzer_sys::fuzz_target;
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    // hostile bytes from either side of a connection must never panic
    let mut requests = BytesMut::from(data);
    let mut server = ServerCodec::default();
    while let Ok(Some(_)) = server.decode(&mut requests) {}
    let _ = server.decode_eof(&mut requests);

    let mut responses = BytesMut::from(data);
    let mut client = ClientCodec::default();
    while let Ok(Some(_)) = client.decode(&mut responses) {}
});
