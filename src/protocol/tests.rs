// test-only module included via protocol/mod.rs
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::core::frame::{Request, Response};
use crate::core::status::StatusCode;
use crate::protocol::access::{CallerIdentity, TrustPolicy};
use crate::protocol::dispatcher::EngineCore;
use crate::protocol::registry::{HandlerEntry, HandlerError, RegistryBuilder};
use crate::transport::aux::AuxForwarder;

const CMD_READ_SENSOR: u16 = 0x0100;
const CMD_WRITE_BIOS: u16 = 0x0200;
const CMD_SFP_DUMP: u16 = 0x0300;
const CMD_RESET_FPGA: u16 = 0x0400;
const CMD_FAILING: u16 = 0x0500;
const CMD_PANICKING: u16 = 0x0600;
const CMD_CHATTY: u16 = 0x0700;

fn user() -> CallerIdentity {
    CallerIdentity::new(1000, 1000, Some(4242))
}

fn root() -> CallerIdentity {
    CallerIdentity::new(0, 0, Some(1))
}

/// Records every request it sees and answers with a canned status.
#[derive(Default)]
struct SpyForwarder {
    calls: Mutex<Vec<Request>>,
    reply: Option<(StatusCode, &'static [u8])>,
}

impl SpyForwarder {
    fn replying(status: StatusCode, result: &'static [u8]) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            reply: Some((status, result)),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl AuxForwarder for SpyForwarder {
    async fn forward(&self, request: Request, _timeout: Duration) -> Response {
        let sequence_id = request.sequence_id;
        self.calls.lock().unwrap().push(request);
        let (status, result) = self.reply.unwrap_or((StatusCode::AuxTimeout, &b""[..]));
        Response::new(sequence_id, status, result)
    }
}

struct Fixture {
    engine: EngineCore,
    sensor_calls: Arc<AtomicUsize>,
    bios_calls: Arc<AtomicUsize>,
}

fn fixture(aux: Option<Arc<dyn AuxForwarder>>) -> Fixture {
    let sensor_calls = Arc::new(AtomicUsize::new(0));
    let bios_calls = Arc::new(AtomicUsize::new(0));

    let sensor = sensor_calls.clone();
    let bios = bios_calls.clone();
    let registry = RegistryBuilder::new()
        .with_frame_limit(64)
        .common(
            HandlerEntry::local(CMD_READ_SENSOR, "read_sensor", move |payload| {
                sensor.fetch_add(1, Ordering::SeqCst);
                Ok(vec![payload[0], 0x2A])
            })
            .payload_len(1, 1),
        )
        .common(
            HandlerEntry::local(CMD_WRITE_BIOS, "write_bios", move |_| {
                bios.fetch_add(1, Ordering::SeqCst);
                Ok(Vec::new())
            })
            .privileged()
            .payload_len(4, 32),
        )
        .common(HandlerEntry::forwarded(CMD_SFP_DUMP, "sfp_dump").payload_len(0, 8))
        .common(HandlerEntry::forwarded(CMD_RESET_FPGA, "reset_fpga").privileged())
        .common(HandlerEntry::local(CMD_FAILING, "ssd_smart", |_| {
            Err(HandlerError::with_reason(0x17, "drive not present"))
        }))
        .common(HandlerEntry::local(CMD_PANICKING, "broken", |_| {
            panic!("handler bug")
        }))
        .common(HandlerEntry::local(CMD_CHATTY, "chatty", |_| Ok(vec![0u8; 65])))
        .build()
        .unwrap();

    let mut engine = EngineCore::new(registry, TrustPolicy::root_only()).with_frame_limit(64);
    if let Some(aux) = aux {
        engine = engine.with_aux(aux, Duration::from_millis(100));
    }
    Fixture {
        engine,
        sensor_calls,
        bios_calls,
    }
}

#[tokio::test]
async fn local_handler_success_echoes_sequence_id() {
    let fx = fixture(None);
    let response = fx
        .engine
        .handle(Request::new(CMD_READ_SENSOR, 0xDEAD_BEEF, vec![7u8]), &user())
        .await;
    assert_eq!(response.sequence_id(), 0xDEAD_BEEF);
    assert_eq!(response.status(), StatusCode::Success);
    assert_eq!(&response.result()[..], &[7, 0x2A]);
    assert_eq!(fx.sensor_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unknown_command_invokes_nothing() {
    let spy = Arc::new(SpyForwarder::default());
    let fx = fixture(Some(spy.clone()));
    let response = fx
        .engine
        .handle(Request::new(0x7777, 5, vec![1u8]), &root())
        .await;
    assert_eq!(response.status(), StatusCode::InvalidCommand);
    assert_eq!(response.sequence_id(), 5);
    assert!(response.result().is_empty());
    assert_eq!(fx.sensor_calls.load(Ordering::SeqCst), 0);
    assert_eq!(fx.bios_calls.load(Ordering::SeqCst), 0);
    assert_eq!(spy.call_count(), 0);
}

#[tokio::test]
async fn out_of_range_payload_never_reaches_handler() {
    let fx = fixture(None);
    for payload in [vec![], vec![1u8, 2]] {
        let response = fx
            .engine
            .handle(Request::new(CMD_READ_SENSOR, 9, payload), &user())
            .await;
        assert_eq!(response.status(), StatusCode::InvalidLength);
        assert_eq!(response.sequence_id(), 9);
    }
    assert_eq!(fx.sensor_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn privileged_local_command_denied_for_public_caller() {
    let fx = fixture(None);
    let response = fx
        .engine
        .handle(Request::new(CMD_WRITE_BIOS, 1, vec![0u8; 8]), &user())
        .await;
    assert_eq!(response.status(), StatusCode::AccessDenied);
    assert_eq!(fx.bios_calls.load(Ordering::SeqCst), 0);

    let response = fx
        .engine
        .handle(Request::new(CMD_WRITE_BIOS, 2, vec![0u8; 8]), &root())
        .await;
    assert_eq!(response.status(), StatusCode::Success);
    assert_eq!(fx.bios_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn access_check_precedes_length_check() {
    let fx = fixture(None);
    // wrong length *and* insufficient privilege: access wins
    let response = fx
        .engine
        .handle(Request::new(CMD_WRITE_BIOS, 3, vec![0u8; 1]), &user())
        .await;
    assert_eq!(response.status(), StatusCode::AccessDenied);
}

#[tokio::test]
async fn denied_forward_never_contacts_aux() {
    let spy = Arc::new(SpyForwarder::replying(StatusCode::Success, b"done"));
    let fx = fixture(Some(spy.clone()));
    let response = fx
        .engine
        .handle(Request::new(CMD_RESET_FPGA, 11, Vec::new()), &user())
        .await;
    assert_eq!(response.status(), StatusCode::AccessDenied);
    assert_eq!(spy.call_count(), 0);
}

#[tokio::test]
async fn invalid_length_forward_never_contacts_aux() {
    let spy = Arc::new(SpyForwarder::replying(StatusCode::Success, b"done"));
    let fx = fixture(Some(spy.clone()));
    let response = fx
        .engine
        .handle(Request::new(CMD_SFP_DUMP, 12, vec![0u8; 9]), &user())
        .await;
    assert_eq!(response.status(), StatusCode::InvalidLength);
    assert_eq!(spy.call_count(), 0);
}

#[tokio::test]
async fn forwarded_command_returns_aux_response() {
    let spy = Arc::new(SpyForwarder::replying(StatusCode::Success, b"sfp-page-a0"));
    let fx = fixture(Some(spy.clone()));
    let response = fx
        .engine
        .handle(Request::new(CMD_SFP_DUMP, 77, vec![0xA0u8]), &user())
        .await;
    assert_eq!(response.status(), StatusCode::Success);
    assert_eq!(response.sequence_id(), 77);
    assert_eq!(&response.result()[..], b"sfp-page-a0");

    let calls = spy.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].command_id, CMD_SFP_DUMP);
    assert_eq!(&calls[0].payload[..], &[0xA0]);
}

#[tokio::test]
async fn aux_failure_statuses_pass_through() {
    let spy = Arc::new(SpyForwarder::default());
    let fx = fixture(Some(spy));
    let response = fx
        .engine
        .handle(Request::new(CMD_SFP_DUMP, 78, Vec::new()), &user())
        .await;
    assert_eq!(response.status(), StatusCode::AuxTimeout);
    assert_eq!(response.sequence_id(), 78);
}

#[tokio::test]
async fn forward_without_aux_link_is_unreachable() {
    let fx = fixture(None);
    let response = fx
        .engine
        .handle(Request::new(CMD_SFP_DUMP, 13, Vec::new()), &user())
        .await;
    assert_eq!(response.status(), StatusCode::AuxUnreachable);
    assert_eq!(response.sequence_id(), 13);
}

#[tokio::test]
async fn handler_error_becomes_handler_failure() {
    let fx = fixture(None);
    let response = fx
        .engine
        .handle(Request::new(CMD_FAILING, 14, Vec::new()), &user())
        .await;
    assert_eq!(response.status(), StatusCode::HandlerFailure(0x17));
    assert!(response.result().is_empty());
}

#[tokio::test]
async fn panicking_handler_does_not_take_down_engine() {
    let fx = fixture(None);
    let response = fx
        .engine
        .handle(Request::new(CMD_PANICKING, 15, Vec::new()), &user())
        .await;
    assert_eq!(response.status(), StatusCode::InternalError);

    // the engine keeps serving
    let response = fx
        .engine
        .handle(Request::new(CMD_READ_SENSOR, 16, vec![1u8]), &user())
        .await;
    assert_eq!(response.status(), StatusCode::Success);
}

#[tokio::test]
async fn oversized_handler_result_is_internal_error() {
    let fx = fixture(None);
    let response = fx
        .engine
        .handle(Request::new(CMD_CHATTY, 17, Vec::new()), &user())
        .await;
    assert_eq!(response.status(), StatusCode::InternalError);
}

#[tokio::test]
async fn outcomes_are_counted() {
    let fx = fixture(None);
    fx.engine
        .handle(Request::new(CMD_READ_SENSOR, 1, vec![1u8]), &user())
        .await;
    fx.engine
        .handle(Request::new(0x7777, 2, Vec::new()), &user())
        .await;
    fx.engine
        .handle(Request::new(CMD_SFP_DUMP, 3, Vec::new()), &user())
        .await;

    let snap = fx.engine.metrics().snapshot();
    assert_eq!(snap.requests_total, 3);
    assert_eq!(snap.requests_local, 1);
    assert_eq!(snap.requests_forwarded, 1);
    assert_eq!(snap.responses_success, 1);
    assert_eq!(snap.invalid_command, 1);
    assert_eq!(snap.aux_unreachable, 1);
}
