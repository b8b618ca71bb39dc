#![allow(clippy::disallowed_methods)]

use std::error::Error;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agent::{Agent, AgentConfig, AgentError, PrintAction, PrintError, SessionEnd};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, accept_async};

const PASSWORD: &str = "agent-secret";

#[derive(Clone, Default)]
struct RecordingPrinter {
    printed: Arc<Mutex<Vec<String>>>,
}

impl PrintAction for RecordingPrinter {
    async fn print(&self, label: &str) -> Result<(), PrintError> {
        self.printed.lock().unwrap().push(label.to_string());
        Ok(())
    }
}

struct BrokenPrinter;

impl PrintAction for BrokenPrinter {
    async fn print(&self, _label: &str) -> Result<(), PrintError> {
        Err(PrintError::EmptyCommand)
    }
}

fn config(addr: SocketAddr) -> AgentConfig {
    AgentConfig {
        ws_host: addr.to_string(),
        ws_password: PASSWORD.to_string(),
        label_max_age_ms: 60_000,
        heartbeat_secs: 10,
        print_command: "lp -o raw".to_string(),
    }
}

fn job_frame(id: u64, timestamp: i64, print: &str) -> Message {
    Message::Text(
        serde_json::json!({ "id": id, "timestamp": timestamp, "print": print })
            .to_string()
            .into(),
    )
}

async fn next_text(ws: &mut WebSocketStream<TcpStream>) -> Option<String> {
    loop {
        match tokio::time::timeout(Duration::from_secs(2), ws.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => return Some(text.to_string()),
            Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => continue,
            _ => return None,
        }
    }
}

/// Next text frame that is not a heartbeat.
async fn next_ack(ws: &mut WebSocketStream<TcpStream>) -> Option<String> {
    loop {
        let text = next_text(ws).await?;
        if text != PASSWORD {
            return Some(text);
        }
    }
}

/// Accept one agent and run `script` against it.
async fn fake_server<F, Fut, T>(script: F) -> Result<(SocketAddr, JoinHandle<T>), Box<dyn Error>>
where
    F: FnOnce(WebSocketStream<TcpStream>) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = T> + Send,
    T: Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let handle = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let ws = accept_async(tcp).await.unwrap();
        script(ws).await
    });
    Ok((addr, handle))
}

#[tokio::test]
async fn test_acks_every_job_and_prints_only_fresh_ones() -> Result<(), Box<dyn Error>> {
    let now = Utc::now().timestamp();
    let (addr, server) = fake_server(move |mut ws| async move {
        assert_eq!(next_text(&mut ws).await.as_deref(), Some(PASSWORD));

        // Ignored until the handshake completes.
        ws.send(job_frame(99, now, "early")).await.unwrap();
        ws.send(Message::Text("authenticated".into())).await.unwrap();

        ws.send(job_frame(1, now, "fresh")).await.unwrap();
        ws.send(job_frame(2, now - 3_600, "stale")).await.unwrap();

        let acks = vec![next_ack(&mut ws).await, next_ack(&mut ws).await];
        ws.close(None).await.unwrap();
        acks
    })
    .await?;

    let printer = RecordingPrinter::default();
    let agent = Agent::new(&config(addr), printer.clone());
    let end = agent.run(std::future::pending()).await?;

    assert_eq!(end, SessionEnd::ServerClosed);
    let acks = server.await?;
    assert_eq!(acks, vec![Some("1".to_string()), Some("2".to_string())]);
    assert_eq!(*printer.printed.lock().unwrap(), vec!["fresh".to_string()]);
    Ok(())
}

#[tokio::test]
async fn test_print_failure_does_not_end_the_session() -> Result<(), Box<dyn Error>> {
    let now = Utc::now().timestamp();
    let (addr, server) = fake_server(move |mut ws| async move {
        next_text(&mut ws).await;
        ws.send(Message::Text("authenticated".into())).await.unwrap();
        ws.send(job_frame(1, now, "a")).await.unwrap();
        ws.send(job_frame(2, now, "b")).await.unwrap();
        let acks = vec![next_ack(&mut ws).await, next_ack(&mut ws).await];
        ws.close(None).await.unwrap();
        acks
    })
    .await?;

    let agent = Agent::new(&config(addr), BrokenPrinter);
    assert_eq!(agent.run(std::future::pending()).await?, SessionEnd::ServerClosed);
    assert_eq!(
        server.await?,
        vec![Some("1".to_string()), Some("2".to_string())]
    );
    Ok(())
}

#[tokio::test]
async fn test_heartbeat_repeats_the_secret() -> Result<(), Box<dyn Error>> {
    let (addr, server) = fake_server(|mut ws| async move {
        ws.send(Message::Text("authenticated".into())).await.unwrap();
        let mut heartbeats = 0;
        while heartbeats < 3 {
            match next_text(&mut ws).await {
                Some(text) if text == PASSWORD => heartbeats += 1,
                _ => break,
            }
        }
        ws.close(None).await.unwrap();
        heartbeats
    })
    .await?;

    let agent = Agent::new(&config(addr), RecordingPrinter::default())
        .with_heartbeat(Duration::from_millis(50));
    agent.run(std::future::pending()).await?;

    assert_eq!(server.await?, 3);
    Ok(())
}

#[tokio::test]
async fn test_shutdown_sends_close_frame() -> Result<(), Box<dyn Error>> {
    let (addr, server) = fake_server(|mut ws| async move {
        loop {
            match tokio::time::timeout(Duration::from_secs(3), ws.next()).await {
                Ok(Some(Ok(Message::Close(_)))) => return true,
                Ok(Some(Ok(_))) => continue,
                _ => return false,
            }
        }
    })
    .await?;

    let agent = Agent::new(&config(addr), RecordingPrinter::default());
    let end = agent
        .run(tokio::time::sleep(Duration::from_millis(200)))
        .await?;

    assert_eq!(end, SessionEnd::Shutdown);
    assert!(server.await?);
    Ok(())
}

#[tokio::test]
async fn test_malformed_job_closes_the_connection() -> Result<(), Box<dyn Error>> {
    let (addr, _server) = fake_server(|mut ws| async move {
        next_text(&mut ws).await;
        ws.send(Message::Text("authenticated".into())).await.unwrap();
        ws.send(Message::Text("{\"id\": \"one\"}".into())).await.unwrap();
        // Hold the socket open until the agent leaves.
        while let Some(Ok(_)) = ws.next().await {}
    })
    .await?;

    let agent = Agent::new(&config(addr), RecordingPrinter::default());
    let result = agent.run(std::future::pending()).await;

    assert!(matches!(result, Err(AgentError::Protocol(_))));
    Ok(())
}

#[tokio::test]
async fn test_rejected_secret_is_an_error() -> Result<(), Box<dyn Error>> {
    let (addr, _server) = fake_server(|mut ws| async move {
        next_text(&mut ws).await;
        ws.send(Message::Text("Fail to authenticate".into())).await.unwrap();
        let _ = ws.close(None).await;
        while let Some(Ok(_)) = ws.next().await {}
    })
    .await?;

    let agent = Agent::new(&config(addr), RecordingPrinter::default());
    let result = agent.run(std::future::pending()).await;

    assert!(matches!(result, Err(AgentError::Protocol(_))));
    Ok(())
}

#[tokio::test]
async fn test_close_before_handshake_is_an_error() -> Result<(), Box<dyn Error>> {
    let (addr, _server) = fake_server(|mut ws| async move {
        next_text(&mut ws).await;
        let _ = ws.close(None).await;
        while let Some(Ok(_)) = ws.next().await {}
    })
    .await?;

    let agent = Agent::new(&config(addr), RecordingPrinter::default());
    let result = agent.run(std::future::pending()).await;

    assert!(matches!(result, Err(AgentError::Protocol(_))));
    Ok(())
}
