use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use super::Broker;
use super::pool::PortPool;
use super::service::{Service, bind_with_fallback};
use super::topic::Topic;
use crate::config::BrokerSettings;
use crate::protocol::{Command, CommandCode, Resolution, decode_response, encode_command};
use crate::transport::{DEFAULT_MAX_FRAME_LEN, receive, request, send};
use crate::utils::error::BrokerError;

fn settings(control_port: u16) -> BrokerSettings {
    BrokerSettings {
        control_port,
        ..BrokerSettings::default()
    }
}

async fn send_command(addr: SocketAddr, command: &Command) -> crate::protocol::Response {
    let frame = command.encode().unwrap();
    let reply = request(addr, &frame, Duration::from_secs(2), DEFAULT_MAX_FRAME_LEN)
        .await
        .unwrap();
    decode_response(&reply).unwrap()
}

#[test]
fn test_topic_new() {
    let topic = Topic::new("test_topic");
    assert_eq!(topic.name, "test_topic");
    assert!(topic.subscribers.is_empty());
}

#[test]
fn test_topic_subscribe_is_idempotent() {
    let mut topic = Topic::new("test_topic");
    assert!(topic.subscribe(4000));
    assert!(!topic.subscribe(4000));
    assert_eq!(topic.subscribers.len(), 1);
}

#[test]
fn test_topic_unsubscribe() {
    let mut topic = Topic::new("test_topic");
    topic.subscribe(4000);
    assert!(topic.unsubscribe(4000));
    assert!(!topic.unsubscribe(4000));
    assert!(topic.is_empty());
}

#[test]
fn test_pool_is_sequential_above_control_port() {
    let mut pool = PortPool::above(58608, 3);
    assert_eq!(pool.remaining(), 3);
    assert_eq!(pool.take(), Some(58609));
    assert_eq!(pool.take(), Some(58610));
    assert_eq!(pool.take(), Some(58611));
    assert_eq!(pool.take(), None);
}

#[test]
fn test_pool_stops_at_highest_port() {
    let mut pool = PortPool::above(65533, 100);
    assert_eq!(pool.remaining(), 2);
    assert_eq!(pool.take(), Some(65534));
    assert_eq!(pool.take(), Some(65535));
    assert_eq!(pool.take(), None);
}

#[test]
fn test_broker_new() {
    let broker = Broker::new(58608, 100);
    assert!(broker.topics.is_empty());
    assert!(broker.clients.is_empty());
    assert_eq!(broker.remaining_ports(), 100);
}

#[test]
fn test_allocate_port_registers_client() {
    let mut broker = Broker::new(1000, 2);
    let (id, port) = broker.allocate_port().unwrap();
    assert_eq!(port, 1001);
    assert_eq!(broker.client_port(&id), Some(1001));

    let (other, port) = broker.allocate_port().unwrap();
    assert_eq!(port, 1002);
    assert_ne!(id, other);

    assert!(matches!(
        broker.allocate_port(),
        Err(BrokerError::PoolExhausted)
    ));
    assert_eq!(broker.clients.len(), 2);
}

#[test]
fn test_broker_subscribe_and_unsubscribe() {
    let mut broker = Broker::default();

    assert!(broker.subscribe("test_topic", 4000));
    assert!(!broker.subscribe("test_topic", 4000));
    assert_eq!(broker.subscribers("test_topic"), vec![4000]);

    assert!(broker.unsubscribe("test_topic", 4000));
    assert!(broker.subscribers("test_topic").is_empty());
    // last subscriber gone, topic dropped
    assert!(!broker.topics.contains_key("test_topic"));
}

#[test]
fn test_unsubscribe_unknown_is_tolerated() {
    let mut broker = Broker::default();
    assert!(!broker.unsubscribe("never", 4000));

    broker.subscribe("news", 4001);
    assert!(!broker.unsubscribe("news", 4000));
    assert_eq!(broker.subscribers("news"), vec![4001]);
}

#[test]
fn test_publish_builds_one_delivery_per_subscriber() {
    let mut broker = Broker::default();
    broker.subscribe("news", 4001);
    broker.subscribe("news", 4002);
    broker.subscribe("other", 4003);

    let mut deliveries = broker.publish("news", b"hello");
    deliveries.sort_by_key(|d| d.port);

    assert_eq!(deliveries.len(), 2);
    assert_eq!(deliveries[0].port, 4001);
    assert_eq!(deliveries[1].port, 4002);
    assert!(deliveries.iter().all(|d| d.topic == "news" && d.data == b"hello"));
}

#[test]
fn test_publish_to_nonexistent_topic() {
    let broker = Broker::default();
    assert!(broker.publish("nonexistent_topic", b"hello").is_empty());
}

#[test]
fn test_handle_port_until_exhausted() {
    let mut broker = Broker::new(2000, 3);

    for expected in 2001..=2003u16 {
        let (response, deliveries) = broker.handle(Command::port());
        assert!(response.is_ok());
        assert_eq!(response.code, Some(CommandCode::Port));
        assert_eq!(response.port().unwrap(), expected);
        assert!(deliveries.is_empty());
    }

    let (response, _) = broker.handle(Command::port());
    assert_eq!(response.resolution, Resolution::Err);
    assert_eq!(response.code, Some(CommandCode::Port));
    assert_eq!(response.reason(), "client port pool exhausted");
}

#[test]
fn test_handle_sub_unsub_pub() {
    let mut broker = Broker::default();

    let (response, _) = broker.handle(Command::subscribe("news", 4001));
    assert!(response.is_ok());
    assert_eq!(response.topic, "news");

    let (response, deliveries) = broker.handle(Command::publish("news", b"hi".to_vec()));
    assert!(response.is_ok());
    assert_eq!(response.code, Some(CommandCode::Pub));
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].port, 4001);

    let (response, _) = broker.handle(Command::unsubscribe("news", 4001));
    assert!(response.is_ok());
    let (_, deliveries) = broker.handle(Command::publish("news", b"hi".to_vec()));
    assert!(deliveries.is_empty());
}

#[test]
fn test_handle_sub_with_bad_port_does_not_mutate() {
    let mut broker = Broker::default();
    let (response, _) = broker.handle(Command::new(CommandCode::Sub, "news", b"abc".to_vec()));
    assert_eq!(response.resolution, Resolution::Err);
    assert!(broker.topics.is_empty());
}

#[tokio::test]
async fn test_bind_with_fallback_steps_down() {
    let busy = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = busy.local_addr().unwrap().port();

    let listener = bind_with_fallback("127.0.0.1", port, 110).await.unwrap();
    let bound = listener.local_addr().unwrap().port();
    assert!(bound < port);
    assert_eq!((port - bound) % 110, 0);
}

#[tokio::test]
async fn test_bind_with_fallback_gives_up_below_zero() {
    let busy = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = busy.local_addr().unwrap().port();

    let result = bind_with_fallback("127.0.0.1", port, port).await;
    assert!(matches!(result, Err(BrokerError::NoFreePort { .. })));
}

#[tokio::test]
async fn test_service_start_and_stop() {
    let mut service = Service::new(settings(0));
    assert!(!service.is_running());

    let addr = service.start().await.unwrap();
    assert!(service.is_running());
    assert_eq!(service.address(), Some(addr));
    assert!(TcpStream::connect(addr).await.is_ok());

    assert!(matches!(
        service.start().await,
        Err(BrokerError::AlreadyRunning)
    ));

    service.stop().await;
    assert!(!service.is_running());
    assert!(TcpStream::connect(addr).await.is_err());

    // stopping twice is harmless
    service.stop().await;
}

#[tokio::test]
async fn test_service_pool_sits_above_bound_port() {
    let mut service = Service::new(BrokerSettings {
        port_pool_size: 2,
        ..settings(0)
    });
    let addr = service.start().await.unwrap();

    let first = send_command(addr, &Command::port()).await;
    assert_eq!(first.port().unwrap(), addr.port() + 1);
    let second = send_command(addr, &Command::port()).await;
    assert_eq!(second.port().unwrap(), addr.port() + 2);

    let exhausted = send_command(addr, &Command::port()).await;
    assert_eq!(exhausted.resolution, Resolution::Err);

    // the broker keeps serving after exhaustion
    let sub = send_command(addr, &Command::subscribe("news", addr.port() + 1)).await;
    assert!(sub.is_ok());
    let state = service.state().unwrap();
    assert_eq!(state.lock().unwrap().subscribers("news"), vec![addr.port() + 1]);

    service.stop().await;
}

#[tokio::test]
async fn test_service_rejects_unknown_command() {
    let mut service = Service::new(settings(0));
    let addr = service.start().await.unwrap();

    let reply = request(addr, &[9, 0, 0], Duration::from_secs(2), DEFAULT_MAX_FRAME_LEN)
        .await
        .unwrap();
    let response = decode_response(&reply).unwrap();
    assert_eq!(response.resolution, Resolution::Err);
    assert_eq!(response.code, None);
    assert_eq!(response.reason(), "invalid message");

    let state = service.state().unwrap();
    assert!(state.lock().unwrap().topics.is_empty());
    service.stop().await;
}

#[tokio::test]
async fn test_service_answers_truncated_frame() {
    let mut service = Service::new(settings(0));
    let addr = service.start().await.unwrap();

    let mut stream = TcpStream::connect(addr).await.unwrap();
    // prefix announces 10 bytes, only 1 follows
    stream.write_all(&[0, 0, 0, 10, b'a']).await.unwrap();
    stream.shutdown().await.unwrap();

    let reply = receive(&mut stream).await.unwrap();
    let response = decode_response(&reply).unwrap();
    assert_eq!(response.resolution, Resolution::Err);
    assert_eq!(response.reason(), "invalid message");

    service.stop().await;
}

#[tokio::test]
async fn test_service_pushes_deliveries() {
    let mut service = Service::new(settings(0));
    let addr = service.start().await.unwrap();

    let subscriber = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = subscriber.local_addr().unwrap().port();

    let sub = send_command(addr, &Command::subscribe("news", port)).await;
    assert!(sub.is_ok());
    let publish = send_command(addr, &Command::publish("news", b"hello".to_vec())).await;
    assert!(publish.is_ok());

    let (mut stream, _) = tokio::time::timeout(Duration::from_secs(2), subscriber.accept())
        .await
        .unwrap()
        .unwrap();
    let frame = receive(&mut stream).await.unwrap();
    let delivered = crate::protocol::decode_command(&frame).unwrap();
    assert_eq!(delivered.topic, "news");
    assert_eq!(delivered.data, b"hello");
    let ack = crate::protocol::Response::ok(CommandCode::Pub, "news", Vec::new());
    send(&mut stream, &ack.encode().unwrap()).await.unwrap();

    service.stop().await;
}

#[tokio::test]
async fn test_publish_succeeds_when_subscriber_is_gone() {
    let mut service = Service::new(settings(0));
    let addr = service.start().await.unwrap();

    let gone = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = gone.local_addr().unwrap().port();
    drop(gone);

    send_command(addr, &Command::subscribe("news", port)).await;
    let frame = encode_command(CommandCode::Pub, "news", b"lost").unwrap();
    let reply = request(addr, &frame, Duration::from_secs(2), DEFAULT_MAX_FRAME_LEN)
        .await
        .unwrap();
    assert!(decode_response(&reply).unwrap().is_ok());

    service.stop().await;
}

#[tokio::test]
async fn test_idle_control_connection_is_closed() {
    let mut service = Service::new(BrokerSettings {
        read_timeout_ms: 100,
        ..settings(0)
    });
    let addr = service.start().await.unwrap();

    let mut idle = TcpStream::connect(addr).await.unwrap();
    service.stop().await;

    let mut buf = [0u8; 8];
    let read = tokio::time::timeout(Duration::from_secs(2), idle.read(&mut buf))
        .await
        .expect("idle connection was never closed");
    assert_eq!(read.unwrap(), 0);
}
