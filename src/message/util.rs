use log::error;
use serde::{de::DeserializeOwned, Serialize};
use crate::error::{Error, Result};

/// A value travelling through a reduction, or the reason it was lost on the
/// way. Failures are passed along the tree so every rank learns of them.
///
pub type Partial<T> = std::result::Result<T, String>;

/// Compute the log-base-two of the next power of two: 8 -> 3, 9 -> 4.
///
pub fn ceil_log2(x: usize) -> usize {
    let mut n = 0;
    while 1 << n < x {
        n += 1
    }
    n
}

/// Encode a value as a MessagePack byte buffer.
///
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    rmp_serde::encode::to_vec(value).map_err(|e| Error::Transport(e.to_string()))
}

/// Decode a value from a MessagePack byte buffer.
///
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    rmp_serde::decode::from_slice(bytes).map_err(|e| Error::Transport(e.to_string()))
}

/// Encode a partial result. If that fails the error is logged and an empty
/// buffer is returned, which no rank can decode as a `Partial`.
///
pub fn encode_partial<T: Serialize>(value: &Partial<T>) -> Vec<u8> {
    encode(value).unwrap_or_else(|e| {
        error!("reduction value could not be encoded: {}", e);
        Vec::new()
    })
}

/// Decode a partial result received from the reduction tree. A buffer which
/// does not decode is logged and becomes a failure.
///
pub fn decode_partial<T: DeserializeOwned>(bytes: &[u8]) -> Partial<T> {
    decode::<Partial<T>>(bytes).unwrap_or_else(|e| {
        error!("reduction value could not be decoded: {}", e);
        Err(e.to_string())
    })
}

/// Combine two encoded partial results with `f`, or pass on the first
/// failure.
///
pub fn fold_partial<T, F>(a: Vec<u8>, b: Vec<u8>, f: F) -> Vec<u8>
where
    T: Serialize + DeserializeOwned,
    F: Fn(T, T) -> T,
{
    let combined = match (decode_partial::<T>(&a), decode_partial::<T>(&b)) {
        (Ok(a), Ok(b)) => Ok(f(a, b)),
        (Err(e), _) | (_, Err(e)) => Err(e),
    };
    encode_partial(&combined)
}

/// Element-wise sum of two encoded `Partial<Vec<f64>>` buffers. This is the
/// fold used to reduce transfer totals across ranks.
///
pub fn sum_f64(a: Vec<u8>, b: Vec<u8>) -> Vec<u8> {
    fold_partial(a, b, |a: Vec<f64>, b: Vec<f64>| {
        let n = a.len().max(b.len());
        (0..n).map(|i| a.get(i).unwrap_or(&0.0) + b.get(i).unwrap_or(&0.0)).collect()
    })
}

#[cfg(test)]
mod test {

    #[test]
    fn ceil_log2_works() {
        assert_eq!(super::ceil_log2(1), 0);
        assert_eq!(super::ceil_log2(8), 3);
        assert_eq!(super::ceil_log2(9), 4);
    }

    use super::Partial;

    #[test]
    fn encoded_vectors_sum_elementwise() {
        let a = super::encode_partial(&Partial::Ok(vec![1.0, 2.0]));
        let b = super::encode_partial(&Partial::Ok(vec![0.5, 0.25, 4.0]));
        let c: Partial<Vec<f64>> = super::decode_partial(&super::sum_f64(a, b));
        assert_eq!(c, Ok(vec![1.5, 2.25, 4.0]));
    }

    #[test]
    fn undecodable_operands_are_passed_on_as_failures() {
        let good = super::encode_partial(&Partial::Ok(vec![1.0]));
        let c: Partial<Vec<f64>> = super::decode_partial(&super::sum_f64(vec![0xc1], good.clone()));
        assert!(c.is_err());

        let failed = super::encode_partial(&Partial::<Vec<f64>>::Err("lost".to_string()));
        let c: Partial<Vec<f64>> = super::decode_partial(&super::sum_f64(good, failed));
        assert_eq!(c, Err("lost".to_string()));

        let c: Partial<Vec<f64>> = super::decode_partial(&[]);
        assert!(c.is_err());
    }
}
