use super::*;
use crossbeam_channel::unbounded;

const WAIT: Duration = Duration::from_secs(10);

#[test]
fn processes_a_request() {
    let (tx, rx) = unbounded();
    let w = Worker::spawn("test", move |v: u32| {
        let _ = tx.send(v);
    })
    .unwrap();
    w.request(7);
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), 7);
    assert!(w.wait_idle(WAIT));
    assert_eq!(w.completed(), 1);
}

#[test]
fn bursts_coalesce_to_latest() {
    let (gate_tx, gate_rx) = bounded::<()>(0);
    let (entered_tx, entered_rx) = unbounded();
    let (seen_tx, seen_rx) = unbounded();
    let w = Worker::spawn("coalesce", move |v: u32| {
        let _ = entered_tx.send(());
        if v == 0 {
            let _ = gate_rx.recv();
        }
        let _ = seen_tx.send(v);
    })
    .unwrap();

    w.request(0);
    entered_rx.recv_timeout(WAIT).unwrap();
    for v in 1..=100 {
        w.request(v);
    }
    gate_tx.send(()).unwrap();

    assert!(w.wait_idle(WAIT));
    let seen: Vec<u32> = seen_rx.try_iter().collect();
    assert_eq!(seen, vec![0, 100]);
    assert_eq!(w.completed(), 2);
}

#[test]
fn panicking_step_does_not_stop_the_loop() {
    let (tx, rx) = unbounded();
    let w = Worker::spawn("panicky", move |v: u32| {
        if v == 1 {
            panic!("boom");
        }
        let _ = tx.send(v);
    })
    .unwrap();
    w.request(1);
    assert!(w.wait_idle(WAIT));
    w.request(2);
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), 2);
    assert!(w.wait_idle(WAIT));
    assert_eq!(w.completed(), 2);
}

#[test]
fn quit_stops_processing() {
    let (tx, rx) = unbounded();
    let w = Worker::spawn("quit", move |v: u32| {
        let _ = tx.send(v);
    })
    .unwrap();
    w.quit();
    w.request(3);
    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    // Quitting twice is harmless.
    w.quit();
}
