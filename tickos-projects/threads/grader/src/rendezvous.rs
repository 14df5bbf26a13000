use std::sync::Arc;
use tickos::{
    sync::SpinLock,
    thread::{Current, ThreadBuilder},
};
use tickos_threads::Rendezvous;

pub fn single_pair() {
    let rendezvous = Arc::new(Rendezvous::new());

    let speaker = {
        let rendezvous = rendezvous.clone();
        ThreadBuilder::new("speaker").spawn(move || {
            for i in 0..7 {
                rendezvous.speak(i);
            }
        })
    };
    let heard = (0..7).map(|_| rendezvous.listen()).collect::<Vec<_>>();
    assert_eq!(speaker.join(), 0);

    assert_eq!(heard, (0..7).collect::<Vec<_>>());
    assert_eq!(rendezvous.waiting_speakers(), 0);
    assert_eq!(rendezvous.waiting_listeners(), 0);
}

pub fn many_to_many() {
    const PEERS: usize = 4;
    const MESSAGES: usize = 5;

    let rendezvous = Arc::new(Rendezvous::new());
    let heard = Arc::new(SpinLock::new(Vec::new()));

    let speakers = (0..PEERS)
        .map(|s| {
            let rendezvous = rendezvous.clone();
            ThreadBuilder::new("speaker").spawn(move || {
                for m in 0..MESSAGES {
                    rendezvous.speak(s * 100 + m);
                }
            })
        })
        .collect::<Vec<_>>();
    let listeners = (0..PEERS)
        .map(|_| {
            let (rendezvous, heard) = (rendezvous.clone(), heard.clone());
            ThreadBuilder::new("listener").spawn(move || {
                for _ in 0..MESSAGES {
                    let value = rendezvous.listen();
                    let mut guard = heard.lock();
                    guard.push(value);
                    guard.unlock();
                }
            })
        })
        .collect::<Vec<_>>();

    for peer in speakers.into_iter().chain(listeners) {
        assert_eq!(peer.join(), 0);
    }

    let mut expected = (0..PEERS)
        .flat_map(|s| (0..MESSAGES).map(move |m| s * 100 + m))
        .collect::<Vec<_>>();
    expected.sort();
    let mut heard = heard.lock();
    heard.sort();
    assert_eq!(*heard, expected, "Every message must be heard exactly once.");
    heard.unlock();
    assert_eq!(rendezvous.waiting_speakers(), 0);
    assert_eq!(rendezvous.waiting_listeners(), 0);
}

pub fn fifo_pairing() {
    const PEERS: usize = 3;

    let rendezvous = Arc::new(Rendezvous::new());
    let heard = Arc::new(SpinLock::new(Vec::new()));

    // Listeners queue up one after the other.
    let mut listeners = Vec::new();
    for id in 0..PEERS {
        let (r, heard) = (rendezvous.clone(), heard.clone());
        listeners.push(ThreadBuilder::new("listener").spawn(move || {
            let value = r.listen();
            let mut guard = heard.lock();
            guard.push((id, value));
            guard.unlock();
        }));
        while rendezvous.waiting_listeners() <= id {
            Current::yield_now();
        }
    }
    for value in 0..PEERS {
        rendezvous.speak(value);
    }
    for listener in listeners {
        assert_eq!(listener.join(), 0);
    }
    let mut guard = heard.lock();
    guard.sort();
    assert_eq!(*guard, (0..PEERS).map(|i| (i, i)).collect::<Vec<_>>());
    guard.unlock();

    // And now the speakers.
    let mut speakers = Vec::new();
    for id in 0..PEERS {
        let r = rendezvous.clone();
        speakers.push(ThreadBuilder::new("speaker").spawn(move || r.speak(id)));
        while rendezvous.waiting_speakers() <= id {
            Current::yield_now();
        }
    }
    let heard = (0..PEERS).map(|_| rendezvous.listen()).collect::<Vec<_>>();
    assert_eq!(heard, (0..PEERS).collect::<Vec<_>>());
    for speaker in speakers {
        assert_eq!(speaker.join(), 0);
    }
    assert_eq!(rendezvous.waiting_speakers(), 0);
    assert_eq!(rendezvous.waiting_listeners(), 0);
}
