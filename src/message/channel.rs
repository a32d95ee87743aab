use crossbeam_channel::{Receiver, Sender};
use super::comm::Communicator;

/// A communicator whose peers are threads of the same process, connected
/// by one channel per ordered pair of ranks. It is the transport used by
/// single-process runs and by the tests; a group of size one never sends.
///
pub struct ChannelCommunicator {
    rank: usize,
    senders: Vec<Sender<Vec<u8>>>,
    receivers: Vec<Receiver<Vec<u8>>>,
}

impl ChannelCommunicator {
    /// Create a fully connected group of `size` communicators. Element `r`
    /// of the returned vector is rank `r`; move each one onto its own
    /// thread.
    ///
    pub fn group(size: usize) -> Vec<Self> {
        let mut senders: Vec<Vec<Sender<Vec<u8>>>> = (0..size).map(|_| Vec::new()).collect();
        let mut receivers: Vec<Vec<Receiver<Vec<u8>>>> = (0..size).map(|_| Vec::new()).collect();

        // senders[a][b] delivers from a to b; receivers[b][a] is its far end.
        for a in 0..size {
            for b in 0..size {
                let (sink, source) = crossbeam_channel::unbounded();
                senders[a].push(sink);
                receivers[b].push(source);
            }
        }
        senders
            .into_iter()
            .zip(receivers)
            .enumerate()
            .map(|(rank, (senders, receivers))| Self { rank, senders, receivers })
            .collect()
    }

    /// A group with a single rank.
    ///
    pub fn single() -> Self {
        Self::group(1).remove(0)
    }
}

impl Communicator for ChannelCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.senders.len()
    }

    fn send(&self, rank: usize, message: Vec<u8>) {
        self.senders[rank]
            .send(message)
            .expect("peer communicator was dropped");
    }

    fn recv(&self, rank: usize) -> Vec<u8> {
        self.receivers[rank]
            .recv()
            .expect("peer communicator was dropped")
    }
}

#[cfg(test)]
mod test {

    use super::ChannelCommunicator;
    use crate::error::Error;
    use crate::message::comm::Communicator;
    use crate::message::util;

    fn run<F, T>(size: usize, f: F) -> Vec<T>
    where
        F: Fn(ChannelCommunicator) -> T + Sync,
        T: Send,
    {
        let f = &f;
        std::thread::scope(|scope| {
            let handles: Vec<_> = ChannelCommunicator::group(size)
                .into_iter()
                .map(|comm| scope.spawn(move || f(comm)))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        })
    }

    #[test]
    fn broadcast_reaches_every_rank() {
        for size in 1..7 {
            let result = run(size, |comm| {
                let value = if comm.rank() == 0 { Some(vec![7, 8, 9]) } else { None };
                comm.broadcast(value)
            });
            assert!(result.iter().all(|v| v == &vec![7, 8, 9]));
        }
    }

    #[test]
    fn all_reduce_sum_works() {
        for size in 1..7 {
            let result = run(size, |comm| {
                let r = comm.rank() as f64;
                comm.all_reduce_sum(&[1.0, r]).unwrap()
            });
            let expected = (0..size).map(|r| r as f64).sum::<f64>();
            assert!(result.iter().all(|v| v == &vec![size as f64, expected]));
        }
    }

    #[test]
    fn a_lost_contribution_fails_the_sum_on_every_rank() {
        let result = run(3, |comm| {
            if comm.rank() == 2 {
                let bytes = comm.all_reduce(util::sum_f64, vec![0xc1]);
                util::decode_partial::<Vec<f64>>(&bytes).map_err(Error::Transport)
            } else {
                comm.all_reduce_sum(&[1.0])
            }
        });
        assert!(result.iter().all(|r| matches!(r, Err(Error::Transport(_)))));
    }

    #[test]
    fn all_gather_is_in_rank_order() {
        let result = run(5, |comm| {
            let first = comm.all_gather(vec![comm.rank() as u8]).unwrap();
            let second = comm.all_gather(vec![10 + comm.rank() as u8]).unwrap();
            (first, second)
        });
        for (first, second) in result {
            assert_eq!(first, vec![vec![0], vec![1], vec![2], vec![3], vec![4]]);
            assert_eq!(second, vec![vec![10], vec![11], vec![12], vec![13], vec![14]]);
        }
    }
}
