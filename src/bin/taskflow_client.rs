//! Demo client: create a task, follow its execution stream, print the outcome.
//!
//! Usage: `taskflow-client [task description...]`. The server address comes
//! from `TASKFLOW_URL` (default `http://localhost:8000`).

use anyhow::{Context as _, bail};
use taskflow::api::dto::{CreateTaskResponse, TaskStatusResponse};
use taskflow::task::{EventData, StreamEvent, truncate_chars};

const DEFAULT_TASK: &str = "Analyze the impact of asynchronous programming on system \
     performance and scalability in modern distributed systems";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let base_url =
        std::env::var("TASKFLOW_URL").unwrap_or_else(|_| "http://localhost:8000".to_string());
    let args: Vec<String> = std::env::args().skip(1).collect();
    let description = if args.is_empty() {
        DEFAULT_TASK.to_string()
    } else {
        args.join(" ")
    };

    let client = reqwest::Client::new();

    banner("Creating task");
    let created: CreateTaskResponse = client
        .post(format!("{base_url}/tasks"))
        .json(&serde_json::json!({ "task_description": description }))
        .send()
        .await
        .context("failed to reach taskflow server")?
        .error_for_status()?
        .json()
        .await?;
    println!("Task created with ID: {}\n", created.task_id);

    banner("Executing task");
    let mut response = client
        .post(format!("{base_url}/tasks/{}/execute", created.task_id))
        .send()
        .await?
        .error_for_status()?;

    let mut buf: Vec<u8> = Vec::new();
    let mut count = 0usize;
    while let Some(chunk) = response.chunk().await? {
        buf.extend_from_slice(&chunk);
        while let Some(pos) = buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = buf.drain(..=pos).collect();
            let line = std::str::from_utf8(&line)?.trim();
            if line.is_empty() {
                continue;
            }
            let event: StreamEvent =
                serde_json::from_str(line).with_context(|| format!("bad event line: {line}"))?;
            count += 1;
            print_event(&event);
        }
    }
    if !buf.iter().all(u8::is_ascii_whitespace) {
        bail!("stream ended mid-record");
    }
    println!("\nTotal events received: {count}\n");

    banner("Final task status");
    let status: TaskStatusResponse = client
        .get(format!("{base_url}/tasks/{}/status", created.task_id))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    println!("Task ID: {}", status.task_id);
    println!("Status: {}", status.status);
    if let Some(output) = status.final_output {
        println!("Final output length: {} characters", output.chars().count());
    }
    if let Some(error) = status.error_message {
        println!("Error: {error}");
    }

    Ok(())
}

fn banner(title: &str) {
    println!("{}", "=".repeat(60));
    println!("{title}");
    println!("{}", "=".repeat(60));
}

fn preview(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        format!("{}...", truncate_chars(text, max))
    } else {
        text.to_string()
    }
}

fn print_event(event: &StreamEvent) {
    match &event.data {
        EventData::StepStarted {
            step_number,
            total_steps,
            description,
            agent_type,
            ..
        } => {
            println!("\nStep {step_number}/{total_steps}: {description}");
            println!("   Agent: {agent_type}");
        }
        EventData::PartialOutput { output, .. } => {
            println!("   Output: {}", preview(output, 100));
        }
        EventData::StepCompleted { .. } => println!("   Step completed"),
        EventData::TaskCompleted {
            final_output,
            total_steps,
            ..
        } => {
            println!("\nTask completed successfully!");
            println!("   Total steps: {total_steps}");
            println!("   Final output preview: {}", preview(final_output, 200));
        }
        EventData::StepFailed {
            step_id,
            error,
            retry_count,
        } => {
            println!("\nError in {step_id} after {retry_count} attempts: {error}");
        }
        EventData::Failed { error } => println!("\nError: {error}"),
    }
}
