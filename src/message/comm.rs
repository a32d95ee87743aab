use crate::error::{Error, Result};
use super::util;

/// Interface for a group of processes that can exchange messages over a
/// network. The underlying transport can in principle be TCP, UDP, or a
/// higher level abstraction like MPI.
///
/// Messages between any ordered pair of ranks are delivered in the order
/// they were sent. All collective operations must be called by every rank
/// in the same order.
///
pub trait Communicator {
    /// Must be implemented to return the rank of this process within the
    /// communicator.
    fn rank(&self) -> usize;

    /// Must be implemented to return the number of peers processes in this
    /// communicator.
    fn size(&self) -> usize;

    /// Must be implemented to send a message to a peer. This method must
    /// return immediately, in other words it is not allowed to block until a
    /// matching receive is posted.
    fn send(&self, rank: usize, message: Vec<u8>);

    /// Must be implemented to receive the next message sent by the given
    /// peer. This method is allowed to block until the message arrives.
    fn recv(&self, rank: usize) -> Vec<u8>;

    /// Implements a binomial tree broadcast from the root node. The message
    /// buffer must be `Some` if this is the root node, and it must be `None`
    /// otherwise.
    ///
    fn broadcast(&self, value: Option<Vec<u8>>) -> Vec<u8> {
        let r = self.rank();
        let p = self.size();

        let value = match value {
            Some(value) => value,
            None => self.recv(r - (1 << r.trailing_zeros())),
        };
        for level in (0..util::ceil_log2(p)).rev() {
            let one = 1 << level;
            let two = 1 << (level + 1);

            if r % two == 0 && r + one < p {
                self.send(r + one, value.clone())
            }
        }
        value
    }

    /// Implements a binomial tree reduce. All ranks return `None` except for
    /// the root.
    ///
    fn reduce<F>(&self, f: F, mut value: Vec<u8>) -> Option<Vec<u8>>
    where
        F: Fn(Vec<u8>, Vec<u8>) -> Vec<u8>,
    {
        let r = self.rank();
        let p = self.size();

        for level in 0..util::ceil_log2(p) {
            let one = 1 << level;
            let two = 1 << (level + 1);

            if r % two == 0 {
                if r + one < p {
                    value = f(value, self.recv(r + one))
                }
            } else {
                self.send(r - one, value);
                return None;
            }
        }
        Some(value)
    }

    /// Implements an all-reduce (symmetric fold) operation over a commutative
    /// binary operator.
    ///
    fn all_reduce<F>(&self, f: F, value: Vec<u8>) -> Vec<u8>
    where
        F: Fn(Vec<u8>, Vec<u8>) -> Vec<u8>,
    {
        self.broadcast(self.reduce(f, value))
    }

    /// Sum a vector of numbers element-wise over all ranks. Every rank
    /// receives the global sum, or the same error if a contribution was
    /// lost on the way.
    ///
    fn all_reduce_sum(&self, values: &[f64]) -> Result<Vec<f64>> {
        let bytes = util::encode_partial(&Ok(values.to_vec()));
        util::decode_partial(&self.all_reduce(util::sum_f64, bytes)).map_err(Error::Transport)
    }

    /// Concatenate one buffer from every rank, in rank order. Every rank
    /// receives the full list.
    ///
    fn all_gather(&self, value: Vec<u8>) -> Result<Vec<Vec<u8>>> {
        let mine = util::encode_partial(&Ok(vec![(self.rank(), value)]));
        let gathered = self.all_reduce(concat_tagged, mine);
        let mut parts: Vec<(usize, Vec<u8>)> = util::decode_partial(&gathered).map_err(Error::Transport)?;
        parts.sort_by_key(|(rank, _)| *rank);
        Ok(parts.into_iter().map(|(_, bytes)| bytes).collect())
    }
}

fn concat_tagged(a: Vec<u8>, b: Vec<u8>) -> Vec<u8> {
    util::fold_partial(a, b, |mut a: Vec<(usize, Vec<u8>)>, b: Vec<(usize, Vec<u8>)>| {
        a.extend(b);
        a
    })
}
