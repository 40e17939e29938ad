use serde::{Deserialize, Serialize};
use serde_json::json;

use a2a_json_rpc::{Dispatcher, Result, Session, SessionOptions, SpecRegistry, a2a};

#[tokio::main]
async fn main() -> Result<()> {
    let handler = Dispatcher::with_spec(SpecRegistry::bundled_arc())
        .on_request(a2a::methods::TASKS_GET, |params, cx| {
            let r: GetTaskParams = params.to()?;
            if r.id != "task-1" {
                return Err(a2a::task_not_found(&r.id));
            }
            cx.success(&json!({
                "id": r.id,
                "status": {"state": "completed"},
                "artifacts": [],
            }))
        })
        .on_request(a2a::methods::TASKS_CANCEL, |params, _cx| {
            let r: GetTaskParams = params.to()?;
            Err(a2a::task_not_cancelable(&r.id))
        });
    Ok(Session::from_stdio(handler, &SessionOptions::default())
        .wait()
        .await?)
}

#[derive(Debug, Serialize, Deserialize)]
struct GetTaskParams {
    id: String,
}
