use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::process::Command;

use a2a_json_rpc::{Result, Session, SessionOptions, a2a};

#[tokio::main]
async fn main() -> Result<()> {
    let client = Session::from_command(
        (),
        Command::new("cargo").args(["run", "--example", "stdio_server"]),
        &SessionOptions::default(),
    )?;
    let task: Value = client
        .request(
            a2a::methods::TASKS_GET,
            Some(&GetTaskParams {
                id: "task-1".to_string(),
            }),
        )
        .await?;
    println!("{}", json!(task));
    Ok(())
}

#[derive(Debug, Serialize, Deserialize)]
struct GetTaskParams {
    id: String,
}
