use a2a_json_rpc::{
    ErrorCode, Handler, NO_PARAMS, Params, RequestContext, Response, Result, Session,
    SessionOptions, SessionResult, bail, bail_public,
};
use tokio::test;

fn make_channel(expose_internals: Option<bool>) -> (Session, Session) {
    Session::new_channel(
        BailService,
        BailService,
        &SessionOptions {
            expose_internals,
            ..SessionOptions::default()
        },
    )
}

struct BailService;

impl Handler for BailService {
    fn request(&mut self, method: &str, _params: Params, cx: RequestContext) -> Result<Response> {
        if method == "bail" {
            bail!("aaa");
        }
        if method == "bail_public" {
            bail_public!(_, "bbb");
        }
        if method == "bail_code" {
            bail_public!(a2a_json_rpc::a2a::TASK_NOT_FOUND, "no such task");
        }
        cx.method_not_found()
    }
}

#[test]
async fn expose_internals_default() {
    let (client, _server) = make_channel(None);
    let ret: SessionResult<()> = client.request("bail", NO_PARAMS).await;
    let e = ret.unwrap_err();
    let msg = e.to_string();
    assert_eq!(msg.contains("aaa"), cfg!(debug_assertions), "{msg}");
}

#[test]
async fn expose_internals_false() {
    let (client, _server) = make_channel(Some(false));
    let ret: SessionResult<()> = client.request("bail", NO_PARAMS).await;
    let e = ret.unwrap_err();
    assert!(!e.to_string().contains("aaa"), "{e}");
    let eo = e.error_object().expect("error response expected");
    assert_eq!(eo.code, ErrorCode::INTERNAL_ERROR);
    assert_eq!(eo.message, ErrorCode::INTERNAL_ERROR.message());
}

#[test]
async fn expose_internals_true() {
    let (client, _server) = make_channel(Some(true));
    let ret: SessionResult<()> = client.request("bail", NO_PARAMS).await;
    let e = ret.unwrap_err();
    assert!(e.to_string().contains("aaa"), "{e}");
}

#[test]
async fn bail_public_is_always_visible() {
    let (client, _server) = make_channel(Some(false));
    let ret: SessionResult<()> = client.request("bail_public", NO_PARAMS).await;
    let e = ret.unwrap_err();
    assert!(e.to_string().contains("bbb"), "{e}");
    assert_eq!(
        e.error_object().unwrap().code,
        ErrorCode::INTERNAL_ERROR
    );
}

#[test]
async fn bail_public_with_a2a_code() {
    let (client, _server) = make_channel(Some(false));
    let ret: SessionResult<()> = client.request("bail_code", NO_PARAMS).await;
    let eo = ret.unwrap_err().error_object().cloned().unwrap();
    assert_eq!(eo.code, a2a_json_rpc::a2a::TASK_NOT_FOUND);
    assert_eq!(eo.message, "no such task");
}

#[test]
async fn unknown_method_code() {
    let (client, _server) = make_channel(None);
    let ret: SessionResult<()> = client.request("missing", NO_PARAMS).await;
    let eo = ret.unwrap_err().error_object().cloned().unwrap();
    assert_eq!(eo.code, ErrorCode::METHOD_NOT_FOUND);
}

#[test]
async fn request_after_shutdown_fails() {
    let (client, _server) = make_channel(None);
    client.shutdown();
    let ret: SessionResult<()> = client.request("bail", NO_PARAMS).await;
    assert!(matches!(
        ret.unwrap_err(),
        a2a_json_rpc::SessionError::Shutdown
    ));
}
