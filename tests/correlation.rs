use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use a2a_json_rpc::{
    Handler, NO_PARAMS, Params, RequestContext, RequestId, Response, Session, SessionError,
    SessionOptions, SessionResult,
};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, duplex, split};
use tokio::test;
use tokio::time::{sleep, timeout};

struct SlowService {
    delay: Option<Duration>,
}

impl Handler for SlowService {
    fn request(
        &mut self,
        method: &str,
        _params: Params,
        cx: RequestContext,
    ) -> a2a_json_rpc::Result<Response> {
        match method {
            "slow" => {
                let delay = self.delay;
                cx.handle_async(async move {
                    match delay {
                        Some(d) => sleep(d).await,
                        None => std::future::pending().await,
                    }
                    Ok("done")
                })
            }
            "ping" => cx.success(&"pong"),
            _ => cx.method_not_found(),
        }
    }
}

#[test]
async fn request_times_out() {
    let options = SessionOptions {
        request_timeout: Some(Duration::from_millis(20)),
        ..SessionOptions::default()
    };
    let (_server, client) =
        Session::new_channel(SlowService { delay: None }, (), &options);
    let ret: SessionResult<String> = client.request("slow", NO_PARAMS).await;
    assert!(matches!(ret.unwrap_err(), SessionError::RequestTimeout));
}

#[test]
async fn session_survives_timeout_and_late_response() -> Result<()> {
    let options = SessionOptions {
        request_timeout: Some(Duration::from_millis(20)),
        ..SessionOptions::default()
    };
    let (_server, client) = Session::new_channel(
        SlowService {
            delay: Some(Duration::from_millis(60)),
        },
        (),
        &options,
    );
    let ret: SessionResult<String> = client.request("slow", NO_PARAMS).await;
    assert!(matches!(ret.unwrap_err(), SessionError::RequestTimeout));

    // The late response arrives as an orphan and is discarded.
    sleep(Duration::from_millis(100)).await;
    let pong: String = client.request("ping", NO_PARAMS).await?;
    assert_eq!(pong, "pong");
    Ok(())
}

#[test]
async fn abandoned_request_does_not_poison_the_session() -> Result<()> {
    let (_server, client) = Session::channel(SlowService { delay: None }, ());

    let pending = client.request("slow", NO_PARAMS);
    let raced: Result<SessionResult<String>, _> =
        timeout(Duration::from_millis(20), pending).await;
    assert!(raced.is_err(), "request should still be pending");
    // Dropping the future above removed its correlation entry.

    let pong: String = client.request("ping", NO_PARAMS).await?;
    assert_eq!(pong, "pong");
    Ok(())
}

#[test]
async fn orphan_response_is_ignored() -> Result<()> {
    let (local, remote) = duplex(1024);
    let (lr, lw) = split(local);
    let client = Session::new((), BufReader::new(lr), lw, &SessionOptions::default());

    let (rr, mut rw) = split(remote);
    let mut rr = BufReader::new(rr);

    // A response nothing asked for, then a real answer to the request the
    // session is about to send.
    let peer = tokio::spawn(async move {
        rw.write_all(b"{\"jsonrpc\":\"2.0\",\"id\":999,\"result\":null}\n")
            .await?;
        let mut line = String::new();
        rr.read_line(&mut line).await?;
        let request: Value = serde_json::from_str(&line)?;
        assert_eq!(request["method"], "ping");
        let id = request["id"].clone();
        let reply = serde_json::json!({"jsonrpc": "2.0", "id": id, "result": "pong"});
        rw.write_all(format!("{reply}\n").as_bytes()).await?;
        anyhow::Ok(())
    });

    let pong: String = client.request("ping", NO_PARAMS).await?;
    assert_eq!(pong, "pong");
    peer.await??;
    Ok(())
}

#[test]
async fn duplicate_inflight_id_is_rejected_without_disturbing_the_original() -> Result<()> {
    let (local, remote) = duplex(1024);
    let (lr, lw) = split(local);
    let _server = Session::new(
        SlowService { delay: None },
        BufReader::new(lr),
        lw,
        &SessionOptions::default(),
    );

    let (rr, mut rw) = split(remote);
    let mut rr = BufReader::new(rr);

    rw.write_all(b"{\"jsonrpc\":\"2.0\",\"id\":7,\"method\":\"slow\"}\n")
        .await?;
    rw.write_all(b"{\"jsonrpc\":\"2.0\",\"id\":7,\"method\":\"ping\"}\n")
        .await?;

    let mut line = String::new();
    rr.read_line(&mut line).await?;
    let reply: Value = serde_json::from_str(&line)?;
    assert_eq!(reply["id"], 7);
    assert_eq!(reply["error"]["code"], -32600);
    Ok(())
}

#[test]
async fn unparsable_line_answers_parse_error_and_continues() -> Result<()> {
    let (local, remote) = duplex(1024);
    let (lr, lw) = split(local);
    let _server = Session::new(
        SlowService { delay: None },
        BufReader::new(lr),
        lw,
        &SessionOptions::default(),
    );

    let (rr, mut rw) = split(remote);
    let mut rr = BufReader::new(rr);

    rw.write_all(b"this is not json\n").await?;
    let mut line = String::new();
    rr.read_line(&mut line).await?;
    let reply: Value = serde_json::from_str(&line)?;
    assert_eq!(reply["id"], Value::Null);
    assert_eq!(reply["error"]["code"], -32700);

    // The session keeps serving after the bad line.
    rw.write_all(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n")
        .await?;
    line.clear();
    rr.read_line(&mut line).await?;
    let reply: Value = serde_json::from_str(&line)?;
    assert_eq!(reply["result"], "pong");
    Ok(())
}

#[test]
async fn peer_disconnect_fails_pending_request() -> Result<()> {
    let (local, remote) = duplex(1024);
    let (lr, lw) = split(local);
    let client = Session::new((), BufReader::new(lr), lw, &SessionOptions::default());

    let (rr, rw) = split(remote);
    // The peer reads the request, then hangs up without answering.
    let peer = tokio::spawn(async move {
        let mut rr = BufReader::new(rr);
        let mut line = String::new();
        rr.read_line(&mut line).await?;
        drop(rr);
        drop(rw);
        anyhow::Ok(())
    });

    let ret: SessionResult<String> = client.request("ping", NO_PARAMS).await;
    assert!(matches!(ret.unwrap_err(), SessionError::Shutdown));
    peer.await??;
    Ok(())
}

#[test]
async fn invalid_utf8_line_answers_parse_error_and_continues() -> Result<()> {
    let (local, remote) = duplex(1024);
    let (lr, lw) = split(local);
    let _server = Session::new(
        SlowService { delay: None },
        BufReader::new(lr),
        lw,
        &SessionOptions::default(),
    );

    let (rr, mut rw) = split(remote);
    let mut rr = BufReader::new(rr);

    rw.write_all(b"\xff\xfe\n").await?;
    let mut line = String::new();
    rr.read_line(&mut line).await?;
    let reply: Value = serde_json::from_str(&line)?;
    assert_eq!(reply["error"]["code"], -32700);

    rw.write_all(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n")
        .await?;
    line.clear();
    rr.read_line(&mut line).await?;
    let reply: Value = serde_json::from_str(&line)?;
    assert_eq!(reply["result"], "pong");
    Ok(())
}

struct CancellableService {
    last_id: Arc<Mutex<Option<RequestId>>>,
}

impl Handler for CancellableService {
    fn request(
        &mut self,
        method: &str,
        _params: Params,
        cx: RequestContext,
    ) -> a2a_json_rpc::Result<Response> {
        match method {
            "slow" => {
                *self.last_id.lock().unwrap() = Some(cx.id().clone());
                cx.handle_async(async {
                    std::future::pending::<()>().await;
                    Ok("never")
                })
            }
            "ping" => cx.success(&"pong"),
            _ => cx.method_not_found(),
        }
    }

    fn notification(
        &mut self,
        method: &str,
        _params: Params,
        cx: a2a_json_rpc::NotificationContext,
    ) -> a2a_json_rpc::Result<()> {
        if method == "cancel" {
            if let Some(id) = self.last_id.lock().unwrap().take() {
                cx.session().cancel_incoming_request(&id);
            }
        }
        Ok(())
    }
}

#[test]
async fn cancelled_incoming_request_never_responds() -> Result<()> {
    let last_id = Arc::new(Mutex::new(None));
    let (_server, client) = Session::channel(
        CancellableService {
            last_id: last_id.clone(),
        },
        (),
    );

    let slow = client.request("slow", NO_PARAMS);
    let cancel = async {
        // Messages dispatch in order, so the request registers first.
        client.notification("cancel", NO_PARAMS).await?;
        anyhow::Ok(())
    };
    let (slow, cancel): (Result<SessionResult<String>, _>, _) =
        tokio::join!(timeout(Duration::from_millis(50), slow), cancel);
    cancel?;
    assert!(slow.is_err(), "cancelled request must stay unanswered");
    Ok(())
}
