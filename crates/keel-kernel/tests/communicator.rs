//! Rendezvous semantics: every spoken word is heard exactly once, and a
//! speaker never returns before its word has been captured.

use std::sync::Arc;

use keel_kernel::{Communicator, Kernel, KernelConfig, Mutex};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn every_spoken_word_is_heard_exactly_once() {
    init_logging();
    let kernel = Kernel::new(KernelConfig::default());
    let k = kernel.clone();
    kernel.run(move || {
        let comm = Arc::new(Communicator::new(&k));
        let heard = Arc::new(Mutex::new(&k, Vec::new()));
        let mut workers = Vec::new();
        for word in 0..4u32 {
            let comm = Arc::clone(&comm);
            let heard = Arc::clone(&heard);
            workers.push(k.spawn(&format!("speaker-{word}"), move || {
                comm.speak(word);
                // by the time speak returns, some listener holds the word
                assert!(heard.lock().contains(&word));
            }));
        }
        for i in 0..4 {
            let comm = Arc::clone(&comm);
            let heard = Arc::clone(&heard);
            workers.push(k.spawn(&format!("listener-{i}"), move || {
                let word = comm.listen();
                heard.lock().push(word);
            }));
        }
        for worker in workers {
            worker.join();
        }
        let mut words = heard.lock().clone();
        words.sort_unstable();
        assert_eq!(words, vec![0, 1, 2, 3]);
    });
}

#[test]
fn listener_blocks_until_a_speaker_arrives() {
    init_logging();
    let kernel = Kernel::new(KernelConfig::default());
    let k = kernel.clone();
    kernel.run(move || {
        let comm = Arc::new(Communicator::new(&k));
        let listener = {
            let comm = Arc::clone(&comm);
            k.spawn("listener", move || {
                assert_eq!(comm.listen(), 0xBEEF);
            })
        };
        k.yield_now(); // let the listener park first
        comm.speak(0xBEEF);
        listener.join();
    });
}

#[test]
fn speaker_blocks_until_a_listener_arrives() {
    init_logging();
    let kernel = Kernel::new(KernelConfig::default());
    let k = kernel.clone();
    kernel.run(move || {
        let comm = Arc::new(Communicator::new(&k));
        let speaker = {
            let comm = Arc::clone(&comm);
            k.spawn("speaker", move || {
                comm.speak(42);
            })
        };
        k.yield_now(); // let the speaker deposit and wait for the handshake
        assert_eq!(comm.listen(), 42);
        speaker.join();
    });
}
