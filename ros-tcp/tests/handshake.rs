mod common;

use std::net::SocketAddr;
use std::time::Duration;

use ros_tcp::msg::{RosMessage, RosService};
use ros_tcp::ros_msg::{AddTwoInts, AddTwoIntsRequest, AddTwoIntsResponse, Int32, RosString};
use ros_tcp::tcpros::header::{self, ConnectionHeader};
use ros_tcp::tcpros::{Connection, ConnectionState};
use ros_tcp::{Builder, Error};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::common::*;

fn subscriber_header(topic: &str, md5sum: &str) -> ConnectionHeader {
    ConnectionHeader::new()
        .with(header::CALLER_ID, "/raw_client")
        .with(header::TOPIC, topic)
        .with(header::MD5SUM, md5sum)
        .with(header::TYPE, "std_msgs/String")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_checksum_mismatch_closes_without_reply() {
    let master = start_master().await;
    let ctx = create_context(&master).await;
    let node = create_node(&ctx, "talker").await;
    let _publisher = node.create_pub::<RosString>("/chatter").build().await.unwrap();
    let addr = SocketAddr::from(([127, 0, 0, 1], node.slave().tcpros_port()));

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = subscriber_header("/chatter", Int32::md5sum());
    stream.write_all(&request.encode().unwrap()).await.unwrap();

    let mut received = Vec::new();
    let read = tokio::time::timeout(Duration::from_secs(2), stream.read_to_end(&mut received))
        .await
        .expect("publisher kept the connection open");
    assert!(read.is_ok());
    assert!(received.is_empty(), "publisher wrote {} bytes", received.len());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_topic_refuses_wildcard_md5sum() {
    let master = start_master().await;
    let ctx = create_context(&master).await;
    let node = create_node(&ctx, "talker").await;
    let _publisher = node.create_pub::<RosString>("/chatter").build().await.unwrap();
    let addr = SocketAddr::from(([127, 0, 0, 1], node.slave().tcpros_port()));

    let mut conn = Connection::connect(addr).await.unwrap();
    conn.write_header(&subscriber_header("/chatter", header::ANY_MD5SUM))
        .await
        .unwrap();
    let reply = conn.read_header().await;
    assert!(matches!(reply, Err(Error::Closed)), "{:?}", reply);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_client_reports_checksum_mismatch() {
    let master = start_master().await;
    let ctx = create_context(&master).await;
    let node = create_node(&ctx, "talker").await;
    let _publisher = node.create_pub::<RosString>("/chatter").build().await.unwrap();
    let addr = SocketAddr::from(([127, 0, 0, 1], node.slave().tcpros_port()));

    let mut conn = Connection::connect(addr).await.unwrap();
    let request = subscriber_header("/chatter", Int32::md5sum());
    let result = ros_tcp::tcpros::handshake::client_handshake(&mut conn, "/chatter", &request, &Int32::type_info()).await;
    assert!(matches!(result, Err(Error::Handshake(_))));
    assert_eq!(conn.state(), ConnectionState::Closed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_topic_probe() {
    let master = start_master().await;
    let ctx = create_context(&master).await;
    let node = create_node(&ctx, "talker").await;
    let publisher = node
        .create_pub::<RosString>("/chatter")
        .with_latching(true)
        .build()
        .await
        .unwrap();
    publisher
        .publish(&RosString {
            data: "latched".into(),
        })
        .unwrap();
    let addr = SocketAddr::from(([127, 0, 0, 1], node.slave().tcpros_port()));

    let mut conn = Connection::connect(addr).await.unwrap();
    conn.write_header(&subscriber_header("/chatter", RosString::md5sum()).with(header::PROBE, "1"))
        .await
        .unwrap();
    let reply = conn.read_header().await.unwrap();
    assert_eq!(reply.get(header::TYPE), Some("std_msgs/String"));
    assert_eq!(reply.get(header::MD5SUM), Some(RosString::md5sum()));
    assert_eq!(reply.get(header::CALLER_ID), Some("/talker"));
    assert!(reply.flag(header::LATCHING));

    // Nothing is streamed after a probe, not even the latched message
    conn.establish().unwrap();
    let frame = tokio::time::timeout(Duration::from_secs(2), conn.read_frame())
        .await
        .unwrap()
        .unwrap();
    assert!(frame.is_none());
    assert_eq!(publisher.subscriber_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_service_probe_reports_types() {
    let master = start_master().await;
    let ctx = create_context(&master).await;
    let node = create_node(&ctx, "adder").await;
    let _server = node
        .create_service::<AddTwoInts>("/add_two_ints")
        .build_with_callback(|req: AddTwoIntsRequest| Ok(AddTwoIntsResponse { sum: req.a + req.b }))
        .await
        .unwrap();
    let addr = SocketAddr::from(([127, 0, 0, 1], node.slave().tcpros_port()));

    let mut conn = Connection::connect(addr).await.unwrap();
    let request = ConnectionHeader::new()
        .with(header::CALLER_ID, "/rosservice")
        .with(header::SERVICE, "/add_two_ints")
        .with(header::MD5SUM, header::ANY_MD5SUM)
        .with(header::PROBE, "1");
    conn.write_header(&request).await.unwrap();

    // A wildcard md5sum learns the service's types
    let reply = conn.read_header().await.unwrap();
    assert_eq!(reply.get(header::TYPE), Some("rospy_tutorials/AddTwoInts"));
    assert_eq!(reply.get(header::MD5SUM), Some(AddTwoInts::md5sum()));
    assert_eq!(reply.get(header::REQUEST_TYPE), Some("rospy_tutorials/AddTwoIntsRequest"));
    assert_eq!(reply.get(header::RESPONSE_TYPE), Some("rospy_tutorials/AddTwoIntsResponse"));

    // Any other md5sum must match
    let mut conn = Connection::connect(addr).await.unwrap();
    let request = ConnectionHeader::new()
        .with(header::CALLER_ID, "/rosservice")
        .with(header::SERVICE, "/add_two_ints")
        .with(header::MD5SUM, "0123456789abcdef0123456789abcdef")
        .with(header::PROBE, "1");
    conn.write_header(&request).await.unwrap();
    let reply = conn.read_header().await;
    assert!(matches!(reply, Err(Error::Closed)), "{:?}", reply);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_unknown_topic_is_refused() {
    let master = start_master().await;
    let ctx = create_context(&master).await;
    let node = create_node(&ctx, "talker").await;
    let addr = SocketAddr::from(([127, 0, 0, 1], node.slave().tcpros_port()));

    let mut conn = Connection::connect(addr).await.unwrap();
    conn.write_header(&subscriber_header("/nobody", RosString::md5sum()))
        .await
        .unwrap();
    let reply = tokio::time::timeout(Duration::from_secs(2), conn.read_header())
        .await
        .unwrap();
    assert!(reply.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_frames_before_handshake_are_rejected() {
    let master = start_master().await;
    let ctx = create_context(&master).await;
    let node = create_node(&ctx, "talker").await;
    let addr = SocketAddr::from(([127, 0, 0, 1], node.slave().tcpros_port()));

    let mut conn = Connection::connect(addr).await.unwrap();
    assert_eq!(conn.state(), ConnectionState::AwaitingHeader);
    assert!(matches!(conn.write_frame(b"early").await, Err(Error::Protocol(_))));
}
