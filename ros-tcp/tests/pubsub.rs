mod common;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use ros_tcp::name::GraphName;
use ros_tcp::ros_msg::{Int32, RosString, Twist, Vector3};
use ros_tcp::{Builder, Error};

use crate::common::*;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

fn hello() -> RosString {
    RosString {
        data: "Hello ROS".into(),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_hello_ros() {
    let master = start_master().await;
    let ctx = create_context(&master).await;
    let talker = create_node(&ctx, "talker").await;
    let listener = create_node(&ctx, "listener").await;

    let publisher = talker.create_pub::<RosString>("/chatter").build().await.unwrap();
    let subscriber = listener.create_sub::<RosString>("/chatter").build().await.unwrap();

    assert!(wait_until(CONNECT_TIMEOUT, || {
        let n = publisher.subscriber_count();
        async move { n == 1 }
    })
    .await);

    publisher.publish(&hello()).unwrap();
    let received = subscriber.recv_timeout(Duration::from_secs(3)).unwrap();
    assert_eq!(received, hello());
    assert_eq!(subscriber.publisher_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_subscriber_before_publisher() {
    let master = start_master().await;
    let ctx = create_context(&master).await;
    let talker = create_node(&ctx, "talker").await;
    let listener = create_node(&ctx, "listener").await;

    let subscriber = listener.create_sub::<RosString>("/chatter").build().await.unwrap();
    assert_eq!(subscriber.publisher_count(), 0);

    // The publisher pushes publisherUpdate to the existing subscriber
    let publisher = talker.create_pub::<RosString>("/chatter").build().await.unwrap();
    assert!(wait_until(CONNECT_TIMEOUT, || {
        let n = publisher.subscriber_count();
        async move { n == 1 }
    })
    .await);

    publisher.publish(&hello()).unwrap();
    let received = tokio::time::timeout(CONNECT_TIMEOUT, subscriber.async_recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, hello());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_latched_message_reaches_late_subscriber() {
    let master = start_master().await;
    let ctx = create_context(&master).await;
    let talker = create_node(&ctx, "talker").await;
    let listener = create_node(&ctx, "listener").await;

    let publisher = talker
        .create_pub::<RosString>("/status")
        .with_latching(true)
        .build()
        .await
        .unwrap();
    publisher
        .publish(&RosString {
            data: "ready".into(),
        })
        .unwrap();

    let subscriber = listener.create_sub::<RosString>("/status").build().await.unwrap();
    let received = tokio::time::timeout(CONNECT_TIMEOUT, subscriber.async_recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received.data, "ready");

    // Delivered once
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(subscriber.try_recv().unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_messages_arrive_in_order() {
    let master = start_master().await;
    let ctx = create_context(&master).await;
    let talker = create_node(&ctx, "talker").await;
    let listener = create_node(&ctx, "listener").await;

    let publisher = talker.create_pub::<Int32>("/counter").build().await.unwrap();
    let subscriber = listener
        .create_sub::<Int32>("/counter")
        .with_queue_size(100)
        .with_tcp_nodelay(true)
        .build()
        .await
        .unwrap();
    assert!(wait_until(CONNECT_TIMEOUT, || {
        let n = publisher.subscriber_count();
        async move { n == 1 }
    })
    .await);

    for i in 0..50 {
        publisher.publish(&Int32 { data: i }).unwrap();
    }
    for i in 0..50 {
        let received = subscriber.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(received.data, i);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_callback_subscriber() {
    let master = start_master().await;
    let ctx = create_context(&master).await;
    let talker = create_node(&ctx, "talker").await;
    let listener = create_node(&ctx, "listener").await;

    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    let subscriber = listener
        .create_sub::<Twist>("/cmd_vel")
        .build_with_callback(move |twist: Twist| sink.lock().push(twist))
        .await
        .unwrap();
    assert!(matches!(subscriber.try_recv(), Err(Error::NoQueue(_))));
    assert!(!subscriber.is_ready());

    let publisher = talker.create_pub::<Twist>("/cmd_vel").build().await.unwrap();
    assert!(wait_until(CONNECT_TIMEOUT, || {
        let n = publisher.subscriber_count();
        async move { n == 1 }
    })
    .await);

    for i in 0..3 {
        let twist = Twist {
            linear: Vector3 {
                x: i as f64,
                ..Default::default()
            },
            angular: Vector3::default(),
        };
        publisher.publish(&twist).unwrap();
    }

    assert!(wait_until(CONNECT_TIMEOUT, || {
        let n = received.lock().len();
        async move { n == 3 }
    })
    .await);
    let xs: Vec<f64> = received.lock().iter().map(|t| t.linear.x).collect();
    assert_eq!(xs, vec![0.0, 1.0, 2.0]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_full_queue_keeps_newest() {
    let master = start_master().await;
    let ctx = create_context(&master).await;
    let talker = create_node(&ctx, "talker").await;
    let listener = create_node(&ctx, "listener").await;

    let publisher = talker.create_pub::<Int32>("/burst").build().await.unwrap();
    let subscriber = listener
        .create_sub::<Int32>("/burst")
        .with_queue_size(2)
        .build()
        .await
        .unwrap();
    assert!(wait_until(CONNECT_TIMEOUT, || {
        let n = publisher.subscriber_count();
        async move { n == 1 }
    })
    .await);

    for i in 0..5 {
        publisher.publish(&Int32 { data: i }).unwrap();
    }
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(subscriber.try_recv().unwrap().map(|m| m.data), Some(3));
    assert_eq!(subscriber.try_recv().unwrap().map(|m| m.data), Some(4));
    assert!(subscriber.try_recv().unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_mismatched_types_never_connect() {
    let master = start_master().await;
    let ctx = create_context(&master).await;
    let talker = create_node(&ctx, "talker").await;
    let listener = create_node(&ctx, "listener").await;

    let publisher = talker.create_pub::<RosString>("/mixed").build().await.unwrap();
    let subscriber = listener.create_sub::<Int32>("/mixed").build().await.unwrap();

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(publisher.subscriber_count(), 0);
    assert_eq!(subscriber.publisher_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_publishers_on_one_node_share_a_topic() {
    let master = start_master().await;
    let ctx = create_context(&master).await;
    let talker = create_node(&ctx, "talker").await;
    let topic = GraphName::parse("/shared").unwrap();

    let first = talker.create_pub::<RosString>("/shared").build().await.unwrap();
    let second = talker.create_pub::<RosString>("shared").build().await.unwrap();
    assert_eq!(first.topic(), second.topic());

    let wrong_type = talker.create_pub::<Int32>("/shared").build().await;
    assert!(matches!(wrong_type, Err(Error::ChecksumMismatch { .. })));

    drop(first);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(master.registry().publishers(&topic).len(), 1);

    drop(second);
    assert!(wait_until(CONNECT_TIMEOUT, || {
        let n = master.registry().publishers(&topic).len();
        async move { n == 0 }
    })
    .await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_private_topic_names() {
    let master = start_master().await;
    let ctx = create_context(&master).await;
    let node = ctx.create_node("camera").with_namespace("robot").build().await.unwrap();

    let publisher = node.create_pub::<RosString>("~image").build().await.unwrap();
    assert_eq!(publisher.topic().as_str(), "/robot/camera/image");

    let relative = node.create_pub::<RosString>("status").build().await.unwrap();
    assert_eq!(relative.topic().as_str(), "/robot/status");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_refresh_reconnects_after_publisher_restart() {
    let master = start_master().await;
    let ctx = create_context(&master).await;
    let listener = create_node(&ctx, "listener").await;
    let subscriber = listener.create_sub::<RosString>("/chatter").build().await.unwrap();

    let talker = create_node(&ctx, "talker").await;
    let publisher = talker.create_pub::<RosString>("/chatter").build().await.unwrap();
    assert!(wait_until(CONNECT_TIMEOUT, || {
        let n = subscriber.publisher_count();
        async move { n == 1 }
    })
    .await);

    drop(publisher);
    talker.shutdown("restarting").await;
    assert!(wait_until(CONNECT_TIMEOUT, || {
        let n = subscriber.publisher_count();
        async move { n == 0 }
    })
    .await);

    let talker = create_node(&ctx, "talker2").await;
    let publisher = talker.create_pub::<RosString>("/chatter").build().await.unwrap();
    assert_eq!(subscriber.refresh_publishers().await.unwrap(), 1);
    assert!(wait_until(CONNECT_TIMEOUT, || {
        let n = publisher.subscriber_count();
        async move { n == 1 }
    })
    .await);

    publisher.publish(&hello()).unwrap();
    assert_eq!(subscriber.recv_timeout(Duration::from_secs(2)).unwrap(), hello());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_shutdown_unregisters_everything() {
    let master = start_master().await;
    let ctx = create_context(&master).await;
    let node = create_node(&ctx, "talker").await;
    let topic = GraphName::parse("/chatter").unwrap();

    let publisher = node.create_pub::<RosString>("/chatter").build().await.unwrap();
    let _subscriber = node.create_sub::<Int32>("/numbers").build().await.unwrap();
    assert_eq!(master.registry().publishers(&topic).len(), 1);

    node.shutdown("test over").await;
    node.shutdown("again").await;
    assert!(node.is_shut_down());

    assert!(master.registry().publishers(&topic).is_empty());
    let numbers = GraphName::parse("/numbers").unwrap();
    assert!(master.registry().subscribers(&numbers).is_empty());
    assert!(matches!(publisher.publish(&hello()), Err(Error::Closed)));

    let late = node.create_pub::<RosString>("/late").build().await;
    assert!(matches!(late, Err(Error::Closed)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_publisher_rebuilt_right_after_drop() {
    let master = start_master().await;
    let ctx = create_context(&master).await;
    let talker = create_node(&ctx, "talker").await;
    let listener = create_node(&ctx, "listener").await;
    let topic = GraphName::parse("/chatter").unwrap();

    let publisher = talker.create_pub::<RosString>("/chatter").build().await.unwrap();
    drop(publisher);
    let publisher = talker.create_pub::<RosString>("/chatter").build().await.unwrap();

    // Let any background unregistration of the first handle run
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(master.registry().publishers(&topic).len(), 1);

    let subscriber = listener.create_sub::<RosString>("/chatter").build().await.unwrap();
    assert!(wait_until(CONNECT_TIMEOUT, || {
        let n = publisher.subscriber_count();
        async move { n == 1 }
    })
    .await);
    publisher.publish(&hello()).unwrap();
    assert_eq!(subscriber.recv_timeout(Duration::from_secs(2)).unwrap(), hello());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_subscriber_rebuilt_right_after_drop() {
    let master = start_master().await;
    let ctx = create_context(&master).await;
    let talker = create_node(&ctx, "talker").await;
    let listener = create_node(&ctx, "listener").await;
    let topic = GraphName::parse("/chatter").unwrap();

    let subscriber = listener.create_sub::<RosString>("/chatter").build().await.unwrap();
    drop(subscriber);
    let subscriber = listener.create_sub::<RosString>("/chatter").build().await.unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(master.registry().subscribers(&topic).len(), 1);

    let publisher = talker.create_pub::<RosString>("/chatter").build().await.unwrap();
    assert!(wait_until(CONNECT_TIMEOUT, || {
        let n = publisher.subscriber_count();
        async move { n == 1 }
    })
    .await);
    publisher.publish(&hello()).unwrap();
    assert_eq!(subscriber.recv_timeout(Duration::from_secs(2)).unwrap(), hello());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_concurrent_builds_share_one_topic() {
    let master = start_master().await;
    let ctx = create_context(&master).await;
    let talker = create_node(&ctx, "talker").await;
    let listener = create_node(&ctx, "listener").await;
    let topic = GraphName::parse("/numbers").unwrap();

    let (first_pub, second_pub) = tokio::join!(
        talker.create_pub::<Int32>("/numbers").build(),
        talker.create_pub::<Int32>("/numbers").build(),
    );
    let (first_pub, second_pub) = (first_pub.unwrap(), second_pub.unwrap());
    assert_eq!(master.registry().publishers(&topic).len(), 1);

    let (first_sub, second_sub) = tokio::join!(
        listener.create_sub::<Int32>("/numbers").build(),
        listener.create_sub::<Int32>("/numbers").build(),
    );
    let (first_sub, second_sub) = (first_sub.unwrap(), second_sub.unwrap());
    assert_eq!(master.registry().subscribers(&topic).len(), 1);

    assert!(wait_until(CONNECT_TIMEOUT, || {
        let n = first_pub.subscriber_count();
        async move { n == 1 }
    })
    .await);
    assert_eq!(second_pub.subscriber_count(), 1);

    second_pub.publish(&Int32 { data: 7 }).unwrap();
    assert_eq!(first_sub.recv_timeout(Duration::from_secs(2)).unwrap().data, 7);
    assert_eq!(second_sub.recv_timeout(Duration::from_secs(2)).unwrap().data, 7);
}
