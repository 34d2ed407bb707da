// stable LSD radix sort of (key, value) pairs, 8 bits per pass
const DIGIT_BITS: u32 = 8;
const BUCKETS: usize = 1 << DIGIT_BITS;

/// Sorts `keys` ascending and carries `values` along. Only the low `bits` bits
/// of each key are looked at; equal keys keep their relative order.
pub fn sort_pairs(keys: &mut [u32], values: &mut [u32], bits: u32) {
    debug_assert_eq!(keys.len(), values.len());
    let n = keys.len();
    if n < 2 || bits == 0 {
        return;
    }

    let mut keys_tmp = vec![0u32; n];
    let mut values_tmp = vec![0u32; n];
    let passes = bits.min(u32::BITS).div_ceil(DIGIT_BITS);

    for pass in 0..passes {
        let shift = pass * DIGIT_BITS;
        let digit = |key: u32| ((key >> shift) as usize) & (BUCKETS - 1);

        let mut counts = [0usize; BUCKETS];
        for &key in keys.iter() {
            counts[digit(key)] += 1;
        }

        // exclusive prefix sum -> first slot of every digit
        let mut next = [0usize; BUCKETS];
        let mut sum = 0;
        for (slot, count) in next.iter_mut().zip(counts.iter()) {
            *slot = sum;
            sum += count;
        }

        for i in 0..n {
            let d = digit(keys[i]);
            keys_tmp[next[d]] = keys[i];
            values_tmp[next[d]] = values[i];
            next[d] += 1;
        }

        keys.copy_from_slice(&keys_tmp);
        values.copy_from_slice(&values_tmp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorts_and_keeps_ties_in_order() {
        let mut keys = vec![5, 3, 5, 0, 3, 300, 1];
        let mut values: Vec<u32> = (0..keys.len() as u32).collect();
        sort_pairs(&mut keys, &mut values, 9);
        assert_eq!(keys, vec![0, 1, 3, 3, 5, 5, 300]);
        assert_eq!(values, vec![3, 6, 1, 4, 0, 2, 5]);
    }

    #[test]
    fn full_width_keys() {
        let mut keys = vec![u32::MAX, 0, 1 << 31, 7];
        let mut values = vec![0, 1, 2, 3];
        sort_pairs(&mut keys, &mut values, 32);
        assert_eq!(keys, vec![0, 7, 1 << 31, u32::MAX]);
        assert_eq!(values, vec![1, 3, 2, 0]);
    }

    #[test]
    fn empty_and_single() {
        let mut keys: Vec<u32> = vec![];
        let mut values: Vec<u32> = vec![];
        sort_pairs(&mut keys, &mut values, 8);
        let mut keys = vec![42];
        let mut values = vec![0];
        sort_pairs(&mut keys, &mut values, 8);
        assert_eq!(keys, vec![42]);
    }
}
