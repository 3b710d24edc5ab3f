use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use ros_tcp::queue::BoundedQueue;

#[test]
fn test_overflow_evicts_oldest() {
    let q = BoundedQueue::new(3);
    for i in 0..3 {
        assert!(!q.push(i));
    }
    assert!(q.push(3));
    assert!(q.push(4));
    assert_eq!(q.len(), 3);

    let drained: Vec<_> = std::iter::from_fn(|| q.try_recv()).collect();
    assert_eq!(drained, vec![2, 3, 4]);
    assert!(q.is_empty());
}

#[test]
fn test_zero_capacity_holds_one() {
    let q = BoundedQueue::new(0);
    assert_eq!(q.capacity(), 1);
    assert!(!q.push("a"));
    assert!(q.push("b"));
    assert_eq!(q.try_recv(), Some("b"));
}

#[test]
fn test_clear() {
    let q = BoundedQueue::new(4);
    q.push(1);
    q.push(2);
    q.clear();
    assert!(q.is_empty());
    assert_eq!(q.try_recv(), None);
}

#[test]
fn test_recv_timeout_waits_full_duration() {
    let q: BoundedQueue<u8> = BoundedQueue::new(2);
    let start = Instant::now();
    assert_eq!(q.recv_timeout(Duration::from_millis(50)), None);
    assert!(start.elapsed() >= Duration::from_millis(50));
}

#[test]
fn test_blocking_recv_wakes_on_push() {
    let q = Arc::new(BoundedQueue::new(2));
    let producer = {
        let q = q.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            q.push(7u32);
        })
    };

    assert_eq!(q.recv_timeout(Duration::from_secs(1)), Some(7));
    producer.join().unwrap();

    let producer = {
        let q = q.clone();
        thread::spawn(move || q.push(8u32))
    };
    assert_eq!(q.recv(), 8);
    producer.join().unwrap();
}

#[test]
fn test_concurrent_producers_never_exceed_capacity() {
    let q = Arc::new(BoundedQueue::new(16));
    let producers: Vec<_> = (0..4)
        .map(|p| {
            let q = q.clone();
            thread::spawn(move || {
                for i in 0..1000 {
                    q.push(p * 1000 + i);
                    assert!(q.len() <= 16);
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }
    assert_eq!(q.len(), 16);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_recv_async() {
    let q = Arc::new(BoundedQueue::new(4));
    let producer = {
        let q = q.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            q.push(42);
        })
    };

    assert_eq!(q.recv_async().await, 42);
    producer.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_cancelled_recv_async_loses_nothing() {
    let q = Arc::new(BoundedQueue::new(4));

    let timed_out = tokio::time::timeout(Duration::from_millis(20), q.recv_async()).await;
    assert!(timed_out.is_err());

    q.push(1);
    assert_eq!(q.recv_async().await, 1);
}
