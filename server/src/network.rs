//! Server network layer handling UDP communications and mutation fan-out

use crate::store::TaskStore;
use crate::subscribers::SubscriberManager;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{Packet, TransportError, MAX_PACKET_SIZE};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived {
        packet: Packet,
        addr: SocketAddr,
    },
    SubscriberTimeout {
        subscriber_id: u32,
    },
    #[allow(dead_code)]
    Shutdown,
}

/// Messages queued for the outbound sender task
///
/// Direct responses and broadcasts both travel through this queue, so the
/// request handler never blocks on socket delivery. A broadcast is expanded
/// to the live subscriber set at drain time, not at queue time.
#[derive(Debug)]
pub enum BusMessage {
    Send { packet: Packet, addr: SocketAddr },
    Broadcast { packet: Packet },
}

/// Main server coordinating the mutation store and broadcast bus
pub struct Server {
    socket: Arc<UdpSocket>,
    subscribers: Arc<RwLock<SubscriberManager>>,
    store: TaskStore,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    bus_tx: mpsc::UnboundedSender<BusMessage>,
    bus_rx: mpsc::UnboundedReceiver<BusMessage>,
}

impl Server {
    pub async fn new(
        addr: &str,
        max_subscribers: usize,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (bus_tx, bus_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            subscribers: Arc::new(RwLock::new(SubscriberManager::new(max_subscribers))),
            store: TaskStore::new(),
            server_tx,
            server_rx,
            bus_tx,
            bus_rx,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.socket.local_addr()
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; MAX_PACKET_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that drains the outbound queue
    ///
    /// Delivery is best-effort and at-most-once per currently registered
    /// subscriber: a failed send is logged and skipped, never retried, and
    /// never surfaced to the mutation that produced the packet.
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let subscribers = Arc::clone(&self.subscribers);
        let mut bus_rx = std::mem::replace(&mut self.bus_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = bus_rx.recv().await {
                match message {
                    BusMessage::Send { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    BusMessage::Broadcast { packet } => {
                        let targets = {
                            let subscribers_guard = subscribers.read().await;
                            subscribers_guard.addrs()
                        };

                        for (subscriber_id, addr) in targets {
                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to subscriber {}: {}", subscriber_id, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that monitors subscriber timeouts
    fn spawn_timeout_checker(&self) {
        let subscribers = Arc::clone(&self.subscribers);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut subscribers_guard = subscribers.write().await;
                    subscribers_guard.check_timeouts()
                };

                for subscriber_id in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::SubscriberTimeout { subscriber_id })
                    {
                        error!("Failed to send timeout message: {}", e);
                        break;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), TransportError> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    /// Queues a direct response for the outbound sender task.
    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.bus_tx.send(BusMessage::Send { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    /// Queues one broadcast event for every live subscriber, the author
    /// included. Called only after the store has committed the mutation.
    fn broadcast_packet(&self, packet: Packet) {
        if let Err(e) = self.bus_tx.send(BusMessage::Broadcast { packet }) {
            error!("Failed to queue broadcast packet: {}", e);
        }
    }

    /// Processes incoming packets and applies mutations to the store
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        {
            let mut subscribers = self.subscribers.write().await;
            subscribers.touch_addr(addr);
        }

        match packet {
            Packet::Connect {
                client_version,
                user_id,
            } => {
                info!(
                    "Client connecting from {} (version: {}, user: {})",
                    addr, client_version, user_id
                );

                // Replace any existing registration from this address
                let existing = {
                    let subscribers = self.subscribers.read().await;
                    subscribers.find_by_addr(addr)
                };

                if let Some(existing_id) = existing {
                    info!("Removing existing subscriber {} from {}", existing_id, addr);
                    let mut subscribers = self.subscribers.write().await;
                    subscribers.remove(existing_id);
                }

                let subscriber_id = {
                    let mut subscribers = self.subscribers.write().await;
                    subscribers.add(addr, user_id)
                };

                if let Some(client_id) = subscriber_id {
                    self.send_packet(Packet::Connected { client_id }, addr);
                } else {
                    self.send_packet(
                        Packet::Disconnected {
                            reason: "Server full".to_string(),
                        },
                        addr,
                    );
                }
            }

            Packet::CreateTask { request_id, draft } => {
                let Some(owner_id) = self.resolve_user(addr).await else {
                    self.reject_unknown(addr);
                    return;
                };

                match self.store.create(owner_id, draft) {
                    Ok(task) => {
                        self.send_packet(
                            Packet::TaskOk {
                                request_id,
                                task: task.clone(),
                            },
                            addr,
                        );
                        self.broadcast_packet(Packet::TaskCreated { task });
                    }
                    Err(error) => {
                        self.send_packet(Packet::RequestFailed { request_id, error }, addr);
                    }
                }
            }

            Packet::UpdateTask {
                request_id,
                id,
                patch,
            } => {
                let Some(owner_id) = self.resolve_user(addr).await else {
                    self.reject_unknown(addr);
                    return;
                };

                match self.store.update(id, owner_id, patch) {
                    Ok(task) => {
                        self.send_packet(
                            Packet::TaskOk {
                                request_id,
                                task: task.clone(),
                            },
                            addr,
                        );
                        self.broadcast_packet(Packet::TaskUpdated { task });
                    }
                    Err(error) => {
                        self.send_packet(Packet::RequestFailed { request_id, error }, addr);
                    }
                }
            }

            Packet::DeleteTask { request_id, id } => {
                let Some(owner_id) = self.resolve_user(addr).await else {
                    self.reject_unknown(addr);
                    return;
                };

                match self.store.delete(id, owner_id) {
                    Ok(id) => {
                        self.send_packet(Packet::DeleteOk { request_id, id }, addr);
                        self.broadcast_packet(Packet::TaskDeleted { id });
                    }
                    Err(error) => {
                        self.send_packet(Packet::RequestFailed { request_id, error }, addr);
                    }
                }
            }

            Packet::ListTasks { request_id } => {
                if self.resolve_user(addr).await.is_none() {
                    self.reject_unknown(addr);
                    return;
                }

                let tasks = self.store.list_all();
                self.send_packet(Packet::TaskList { request_id, tasks }, addr);
            }

            Packet::Ping => {
                self.send_packet(Packet::Pong, addr);
            }

            Packet::Disconnect => {
                let subscriber_id = {
                    let subscribers = self.subscribers.read().await;
                    subscribers.find_by_addr(addr)
                };

                if let Some(subscriber_id) = subscriber_id {
                    let mut subscribers = self.subscribers.write().await;
                    subscribers.remove(subscriber_id);
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    async fn resolve_user(&self, addr: SocketAddr) -> Option<u64> {
        let subscribers = self.subscribers.read().await;
        subscribers.user_id_for_addr(addr)
    }

    /// Tells an unregistered sender to handshake before mutating.
    fn reject_unknown(&self, addr: SocketAddr) {
        warn!("Request from unregistered address {}", addr);
        self.send_packet(
            Packet::Disconnected {
                reason: "Not connected".to_string(),
            },
            addr,
        );
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        let mut stats_interval = interval(Duration::from_secs(30));

        info!("Server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::SubscriberTimeout { subscriber_id }) => {
                            debug!("Subscriber {} timed out", subscriber_id);
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                _ = stats_interval.tick() => {
                    let subscriber_count = {
                        let subscribers = self.subscribers.read().await;
                        subscribers.len()
                    };

                    if subscriber_count > 0 {
                        debug!(
                            "{} subscribers, {} tasks stored",
                            subscriber_count,
                            self.store.len()
                        );
                    }
                },
            }
        }

        Ok(())
    }
}
