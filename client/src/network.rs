//! Client network loop: requests, broadcast intake, reconnect handling

use crate::cache::TaskCache;
use crate::connection::ConnectionMonitor;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{
    Packet, Task, TaskDraft, TaskPatch, TransportError, MAX_PACKET_SIZE, PROTOCOL_VERSION,
    SUBSCRIBER_TIMEOUT_SECS,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::UdpSocket;
use tokio::time::interval;

/// What a pending request id was issued for, so its direct response can be
/// routed through the matching merge path. Responses to ids no longer in
/// the map (e.g. resolved after a reconnect reset) are ignored safely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingRequest {
    Create,
    Update,
    Delete,
    List,
}

/// A parsed user command from the interactive prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List,
    Add { title: String },
    Done { id: u64 },
    Edit { id: u64, title: String },
    Remove { id: u64 },
    Quit,
}

pub struct Client {
    socket: UdpSocket,
    server_addr: SocketAddr,
    user_id: u64,
    client_id: Option<u32>,

    cache: TaskCache,
    monitor: ConnectionMonitor,

    next_request_id: u32,
    pending: HashMap<u32, PendingRequest>,
}

impl Client {
    pub async fn new(server_addr: &str, user_id: u64) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = server_addr.parse()?;

        Ok(Client {
            socket,
            server_addr,
            user_id,
            client_id: None,
            cache: TaskCache::new(),
            monitor: ConnectionMonitor::new(),
            next_request_id: 1,
            pending: HashMap::new(),
        })
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.cache.tasks()
    }

    pub fn is_connected(&self) -> bool {
        self.monitor.is_connected()
    }

    async fn connect(&mut self) -> Result<(), TransportError> {
        info!("Connecting to server as user {}...", self.user_id);

        let packet = Packet::Connect {
            client_version: PROTOCOL_VERSION,
            user_id: self.user_id,
        };
        self.send_packet(&packet).await
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), TransportError> {
        let data = serialize(packet)?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    fn next_request_id(&mut self, kind: PendingRequest) -> u32 {
        let request_id = self.next_request_id;
        self.next_request_id += 1;
        self.pending.insert(request_id, kind);
        request_id
    }

    async fn request_create(&mut self, draft: TaskDraft) -> Result<(), TransportError> {
        let request_id = self.next_request_id(PendingRequest::Create);
        self.send_packet(&Packet::CreateTask { request_id, draft })
            .await
    }

    async fn request_update(&mut self, id: u64, patch: TaskPatch) -> Result<(), TransportError> {
        let request_id = self.next_request_id(PendingRequest::Update);
        self.send_packet(&Packet::UpdateTask {
            request_id,
            id,
            patch,
        })
        .await
    }

    async fn request_delete(&mut self, id: u64) -> Result<(), TransportError> {
        let request_id = self.next_request_id(PendingRequest::Delete);
        self.send_packet(&Packet::DeleteTask { request_id, id })
            .await
    }

    async fn request_list(&mut self) -> Result<(), TransportError> {
        let request_id = self.next_request_id(PendingRequest::List);
        self.send_packet(&Packet::ListTasks { request_id }).await
    }

    /// Merges one inbound packet into local state. Direct responses and
    /// broadcast events funnel into the same cache paths, which is what
    /// makes the author's own echo harmless.
    async fn handle_packet(&mut self, packet: Packet) {
        self.monitor.touch();

        match packet {
            Packet::Connected { client_id } => {
                info!("Connected! Client ID: {}", client_id);
                self.client_id = Some(client_id);

                if self.monitor.mark_connected() {
                    // Anything broadcast while we were away is lost for
                    // good; a full fetch is the only recovery
                    self.pending.clear();
                    if let Err(e) = self.request_list().await {
                        error!("Failed to request resync: {}", e);
                    }
                }
            }

            Packet::TaskOk { request_id, task } => match self.pending.remove(&request_id) {
                Some(PendingRequest::Create) => self.cache.apply_created(task),
                Some(PendingRequest::Update) => self.cache.apply_updated(task),
                _ => debug!("Ignoring response to unknown request {}", request_id),
            },

            Packet::DeleteOk { request_id, id } => {
                if self.pending.remove(&request_id).is_some() {
                    self.cache.apply_deleted(id);
                } else {
                    debug!("Ignoring response to unknown request {}", request_id);
                }
            }

            Packet::TaskList { request_id, tasks } => {
                if self.pending.remove(&request_id).is_some() {
                    info!("Synced {} tasks", tasks.len());
                    self.cache.hydrate(tasks);
                } else {
                    debug!("Ignoring response to unknown request {}", request_id);
                }
            }

            Packet::RequestFailed { request_id, error } => {
                self.pending.remove(&request_id);
                warn!("Request {} failed: {}", request_id, error);
                println!("error: {}", error);
            }

            Packet::TaskCreated { task } => self.cache.apply_created(task),
            Packet::TaskUpdated { task } => self.cache.apply_updated(task),
            Packet::TaskDeleted { id } => self.cache.apply_deleted(id),

            Packet::Pong => {}

            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                self.monitor.mark_disconnected();
                self.client_id = None;
            }

            _ => {
                warn!("Unexpected packet type from server");
            }
        }
    }

    async fn handle_command(&mut self, command: Command) -> Result<bool, TransportError> {
        match command {
            Command::List => {
                self.print_tasks();
            }
            Command::Add { title } => {
                self.request_create(TaskDraft {
                    title,
                    description: None,
                    category: None,
                })
                .await?;
            }
            Command::Done { id } => {
                let completed = self
                    .cache
                    .get(id)
                    .map(|task| !task.completed)
                    .unwrap_or(true);
                self.request_update(
                    id,
                    TaskPatch {
                        completed: Some(completed),
                        ..Default::default()
                    },
                )
                .await?;
            }
            Command::Edit { id, title } => {
                self.request_update(
                    id,
                    TaskPatch {
                        title: Some(title),
                        ..Default::default()
                    },
                )
                .await?;
            }
            Command::Remove { id } => {
                self.request_delete(id).await?;
            }
            Command::Quit => return Ok(true),
        }

        Ok(false)
    }

    fn print_tasks(&self) {
        let tasks = self.cache.tasks();
        if tasks.is_empty() {
            println!("(no tasks)");
            return;
        }

        for task in tasks {
            println!(
                "[{}] #{} {} ({}, user {})",
                if task.completed { "x" } else { " " },
                task.id,
                task.title,
                task.category,
                task.owner_id
            );
        }
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.connect().await?;

        let mut ping_interval = interval(Duration::from_secs(1));
        let mut liveness_interval = interval(Duration::from_secs(1));
        let timeout = Duration::from_secs(SUBSCRIBER_TIMEOUT_SECS);

        let mut stdin = BufReader::new(tokio::io::stdin()).lines();
        let mut buffer = [0u8; MAX_PACKET_SIZE];

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, _)) => {
                            if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                                self.handle_packet(packet).await;
                            }
                        },
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                line = stdin.next_line() => {
                    match line? {
                        Some(line) => {
                            match parse_command(&line) {
                                Some(command) => {
                                    if self.handle_command(command).await? {
                                        break;
                                    }
                                }
                                None => {
                                    if !line.trim().is_empty() {
                                        println!("commands: ls | add <title> | done <id> | edit <id> <title> | rm <id> | quit");
                                    }
                                }
                            }
                        }
                        None => break,
                    }
                },

                _ = ping_interval.tick() => {
                    if self.monitor.is_connected() {
                        if let Err(e) = self.send_packet(&Packet::Ping).await {
                            error!("Error sending ping: {}", e);
                        }
                    }
                },

                _ = liveness_interval.tick() => {
                    if self.monitor.is_timed_out(timeout) {
                        warn!("Server silent for {}s, reconnecting", timeout.as_secs());
                        self.monitor.mark_disconnected();
                        self.client_id = None;
                    }

                    if !self.monitor.is_connected() {
                        if let Err(e) = self.connect().await {
                            error!("Reconnect attempt failed: {}", e);
                        }
                    }
                },
            }
        }

        if self.monitor.is_connected() {
            let _ = self.send_packet(&Packet::Disconnect).await;
        }

        Ok(())
    }
}

/// Parses one line from the interactive prompt.
pub fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    let (word, rest) = match line.split_once(' ') {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    match word {
        "ls" if rest.is_empty() => Some(Command::List),
        "add" if !rest.is_empty() => Some(Command::Add {
            title: rest.to_string(),
        }),
        "done" => rest.parse().ok().map(|id| Command::Done { id }),
        "rm" => rest.parse().ok().map(|id| Command::Remove { id }),
        "edit" => {
            let (id, title) = rest.split_once(' ')?;
            let id = id.parse().ok()?;
            let title = title.trim();
            if title.is_empty() {
                return None;
            }
            Some(Command::Edit {
                id,
                title: title.to_string(),
            })
        }
        "quit" | "exit" => Some(Command::Quit),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::StoreError;

    fn task(id: u64, title: &str, created_at: u64) -> Task {
        Task::new(
            id,
            1,
            created_at,
            TaskDraft {
                title: title.to_string(),
                description: None,
                category: None,
            },
        )
    }

    async fn test_client() -> Client {
        // Discard-port server address: sends succeed locally, nothing answers
        Client::new("127.0.0.1:9", 1).await.unwrap()
    }

    #[tokio::test]
    async fn test_connected_triggers_resync_once() {
        let mut client = test_client().await;

        client.handle_packet(Packet::Connected { client_id: 3 }).await;
        assert!(client.is_connected());
        assert_eq!(client.pending.len(), 1);
        assert!(client
            .pending
            .values()
            .all(|kind| *kind == PendingRequest::List));

        // A repeated confirmation must not queue another fetch
        client.handle_packet(Packet::Connected { client_id: 3 }).await;
        assert_eq!(client.pending.len(), 1);
    }

    #[tokio::test]
    async fn test_direct_response_and_echo_deduplicate() {
        let mut client = test_client().await;
        let created = task(5, "Buy milk", 100);

        let request_id = client.next_request_id(PendingRequest::Create);

        // Echo arrives first, then the direct response resolves
        client
            .handle_packet(Packet::TaskCreated {
                task: created.clone(),
            })
            .await;
        client
            .handle_packet(Packet::TaskOk {
                request_id,
                task: created,
            })
            .await;

        let tasks = client.tasks();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "Buy milk");
    }

    #[tokio::test]
    async fn test_stale_response_ignored() {
        let mut client = test_client().await;

        // Response to a request id we no longer track (cleared on reconnect)
        client
            .handle_packet(Packet::TaskOk {
                request_id: 99,
                task: task(5, "Buy milk", 100),
            })
            .await;

        assert!(client.tasks().is_empty());
    }

    #[tokio::test]
    async fn test_task_list_hydrates_projection() {
        let mut client = test_client().await;
        client.cache.apply_created(task(7, "Deleted while away", 50));

        let request_id = client.next_request_id(PendingRequest::List);
        client
            .handle_packet(Packet::TaskList {
                request_id,
                tasks: vec![task(1, "Buy milk", 100)],
            })
            .await;

        // Resync heals the missed delete
        let tasks = client.tasks();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, 1);
    }

    #[tokio::test]
    async fn test_request_failed_clears_pending() {
        let mut client = test_client().await;
        let request_id = client.next_request_id(PendingRequest::Update);

        client
            .handle_packet(Packet::RequestFailed {
                request_id,
                error: StoreError::NotFound,
            })
            .await;

        assert!(client.pending.is_empty());
        assert!(client.tasks().is_empty());
    }

    #[tokio::test]
    async fn test_disconnected_resets_liveness() {
        let mut client = test_client().await;
        client.handle_packet(Packet::Connected { client_id: 3 }).await;

        client
            .handle_packet(Packet::Disconnected {
                reason: "Server full".to_string(),
            })
            .await;

        assert!(!client.is_connected());
        assert_eq!(client.client_id, None);
    }

    #[test]
    fn test_parse_command_variants() {
        assert_eq!(parse_command("ls"), Some(Command::List));
        assert_eq!(
            parse_command("add Buy milk"),
            Some(Command::Add {
                title: "Buy milk".to_string()
            })
        );
        assert_eq!(parse_command("done 3"), Some(Command::Done { id: 3 }));
        assert_eq!(
            parse_command("edit 3 Buy oat milk"),
            Some(Command::Edit {
                id: 3,
                title: "Buy oat milk".to_string()
            })
        );
        assert_eq!(parse_command("rm 3"), Some(Command::Remove { id: 3 }));
        assert_eq!(parse_command("quit"), Some(Command::Quit));
    }

    #[test]
    fn test_parse_command_rejects_malformed() {
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("add"), None);
        assert_eq!(parse_command("done abc"), None);
        assert_eq!(parse_command("edit 3"), None);
        assert_eq!(parse_command("edit x title"), None);
        assert_eq!(parse_command("frobnicate"), None);
    }
}
