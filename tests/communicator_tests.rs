use std::time::Duration;

use mesh_dofs::algs::communicator::{
    CommTag, Communicator, NoComm, ThreadComm, Wait, allgather_u64, allgather_varlen,
};
use mesh_dofs::dof_error::{DofError, ErrorClass};

#[test]
fn thread_fifo_order_per_sender() {
    let tag = CommTag::new(0x1001);
    let comms = ThreadComm::world(2);
    for i in 0..10u8 {
        comms[0].isend(1, tag, &[i]).wait();
    }
    let out: Vec<u8> = (0..10)
        .map(|_| comms[1].probe_recv(tag).unwrap().1[0])
        .collect();
    assert_eq!(out, (0u8..10u8).collect::<Vec<_>>());
}

#[test]
fn empty_messages_are_delivered() {
    let tag = CommTag::new(3);
    let comms = ThreadComm::world(2);
    comms[1].isend(0, tag, &[]);
    assert_eq!(comms[0].probe_recv(tag).unwrap(), (1, Vec::new()));
}

#[test]
fn receive_times_out_as_comm_error() {
    let comms = ThreadComm::world_with_timeout(2, Duration::from_millis(20));
    let err = comms[0].probe_recv(CommTag::new(9)).unwrap_err();
    assert!(matches!(err, DofError::CommError { .. }));
    assert_eq!(err.class(), ErrorClass::Communication);
}

#[test]
fn gathers_across_threads() {
    let comms = ThreadComm::world(4);
    let out: Vec<(Vec<u64>, Vec<Vec<u8>>)> = std::thread::scope(|s| {
        let hs: Vec<_> = comms
            .into_iter()
            .map(|c| {
                s.spawn(move || {
                    let r = c.rank();
                    let counts = allgather_u64(&c, 10 * r as u64);
                    c.barrier();
                    let bytes = allgather_varlen(&c, &vec![r as u8; 3 - r.min(3)]);
                    (counts, bytes)
                })
            })
            .collect();
        hs.into_iter().map(|h| h.join().unwrap()).collect()
    });
    for (counts, bytes) in out {
        assert_eq!(counts, vec![0, 10, 20, 30]);
        assert_eq!(bytes, vec![vec![0, 0, 0], vec![1, 1], vec![2], vec![]]);
    }
}

#[test]
fn serial_communicator() {
    assert_eq!(NoComm.rank(), 0);
    assert_eq!(NoComm.size(), 1);
    NoComm.barrier();
    assert_eq!(NoComm.isend(0, CommTag::new(1), b"x").wait(), None);
    assert_eq!(allgather_varlen(&NoComm, &[]), vec![Vec::<u8>::new()]);
}

#[test]
fn commtag_offset_wraps() {
    let t = CommTag::new(u16::MAX).offset(1);
    assert_eq!(t.as_u16(), 0);
}
