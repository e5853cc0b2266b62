//! Synchronous RPC bridge: one request line out, one reply line back.
//!
//! Request ids are never matched against replies: the bridge relies on the
//! child answering strictly in order, which holds because each exchange runs
//! under that child's channel lock. Concurrent callers against the same
//! server are serialized, not multiplexed.

use tracing::{debug, warn};

use crate::codec::{self, RequestFrame, ResponseFrame};
use crate::error::{AssistantError, AssistantResult};
use crate::registry::Registry;

/// Send `frame` to `server` and block for exactly one reply.
///
/// There is no read timeout: a child that never answers stalls the caller.
///
/// # Errors
///
/// * [`AssistantError::ServerUnavailable`]: not registered or exited; nothing
///   is written.
/// * [`AssistantError::NoResponse`]: the child closed its output or sent a
///   blank line.
/// * [`AssistantError::Decode`]: the reply is not a JSON object.
/// * [`AssistantError::Io`] / [`AssistantError::Encode`]: transport failures.
pub fn call(
    registry: &Registry,
    server: &str,
    frame: &RequestFrame,
) -> AssistantResult<ResponseFrame> {
    let unavailable = || AssistantError::ServerUnavailable {
        name: server.to_owned(),
    };

    let handle = registry.get(server).ok_or_else(unavailable)?;
    if !handle.is_alive() {
        warn!(server, "bridge target has exited");
        return Err(unavailable());
    }

    let line = codec::encode(frame)?;
    debug!(server, method = %frame.method, "sending request");

    let reply = {
        let mut channel = handle.channel();
        channel.write_line(&line)?;
        channel.read_line()?
    };

    if reply.trim().is_empty() {
        return Err(AssistantError::NoResponse {
            name: server.to_owned(),
        });
    }

    debug!(server, bytes = reply.len(), "received reply");
    codec::decode(&reply)
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::process::LaunchSpec;

    fn sh(script: &str) -> LaunchSpec {
        LaunchSpec::new("sh", ["-c", script])
    }

    fn ping() -> RequestFrame {
        RequestFrame::new(1, "ping", json!({}))
    }

    #[test]
    fn unregistered_server_is_unavailable() {
        let registry = Registry::default();
        let err = call(&registry, "standards", &ping()).expect_err("unregistered server");
        assert!(matches!(
            err,
            AssistantError::ServerUnavailable { ref name } if name == "standards"
        ));
    }

    #[test]
    fn closed_stream_is_no_response() {
        let registry = Registry::default();
        registry.start("mute", &sh("read line")).expect("start");

        let err = call(&registry, "mute", &ping()).expect_err("closed stream");
        assert!(matches!(err, AssistantError::NoResponse { ref name } if name == "mute"));
        registry.stop_all(Duration::from_millis(200));
    }

    #[test]
    fn blank_reply_is_no_response() {
        let registry = Registry::default();
        registry.start("blank", &sh("read line; echo; sleep 5")).expect("start");

        let err = call(&registry, "blank", &ping()).expect_err("blank reply");
        assert!(matches!(err, AssistantError::NoResponse { .. }));
        registry.stop_all(Duration::from_secs(2));
    }

    #[test]
    fn malformed_reply_is_a_decode_error() {
        let registry = Registry::default();
        registry.start("noisy", &sh("read line; echo not-json; sleep 5")).expect("start");

        let err = call(&registry, "noisy", &ping()).expect_err("malformed reply");
        assert!(matches!(err, AssistantError::Decode { .. }));
        registry.stop_all(Duration::from_secs(2));
    }

    #[test]
    fn replies_come_back_in_order() {
        let registry = Registry::default();
        let script =
            r#"while read line; do echo '{"jsonrpc":"2.0","id":1,"result":{"ok":true}}'; done"#;
        registry.start("loop", &sh(script)).expect("start");

        for _ in 0..3 {
            let reply = call(&registry, "loop", &ping()).expect("call");
            assert_eq!(reply.result, Some(json!({"ok": true})));
            assert!(reply.error.is_none());
        }
        registry.stop_all(Duration::from_secs(2));
    }

    #[test]
    fn exited_server_is_unavailable() {
        let registry = Registry::default();
        let handle = registry.start("gone", &sh("exit 0")).expect("start");
        for _ in 0..100 {
            if !handle.is_alive() {
                break;
            }
            std::thread::sleep(Duration::from_millis(20));
        }

        let err = call(&registry, "gone", &ping()).expect_err("exited server");
        assert!(matches!(err, AssistantError::ServerUnavailable { .. }));
        registry.stop_all(Duration::from_millis(100));
    }
}
