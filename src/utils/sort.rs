use std::cmp::Ordering;

/// u32-key LSD radix sort for SoA (inds/vals).
/// - Sorts by inds ascending
/// - Reorders vals accordingly
/// - Stable: equal keys keep their input order
///
/// Complexity: 4 passes, each O(n + 256)
pub fn radix_sort_u32_soa<N: Copy>(inds: &mut [u32], vals: &mut [N]) {
    debug_assert_eq!(inds.len(), vals.len());
    let n = inds.len();
    if n <= 1 {
        return;
    }
    // small inputs: insertion sort beats allocating scratch
    if n <= 32 {
        insertion_sort_u32_soa(inds, vals);
        return;
    }

    let mut src: Vec<(u32, N)> = inds.iter().copied().zip(vals.iter().copied()).collect();
    let mut dst: Vec<(u32, N)> = src.clone();

    for shift in [0u32, 8, 16, 24] {
        let mut count = [0usize; 256];
        for &(k, _) in &src {
            count[((k >> shift) & 0xFF) as usize] += 1;
        }
        // skip passes where every key shares the byte
        if count.iter().any(|&c| c == n) {
            continue;
        }
        let mut sum = 0usize;
        for c in count.iter_mut() {
            let tmp = *c;
            *c = sum;
            sum += tmp;
        }
        for &(k, v) in &src {
            let b = ((k >> shift) & 0xFF) as usize;
            dst[count[b]] = (k, v);
            count[b] += 1;
        }
        std::mem::swap(&mut src, &mut dst);
    }

    for (i, (k, v)) in src.into_iter().enumerate() {
        inds[i] = k;
        vals[i] = v;
    }
}

fn insertion_sort_u32_soa<N: Copy>(inds: &mut [u32], vals: &mut [N]) {
    for i in 1..inds.len() {
        let mut j = i;
        while j > 0 && inds[j] < inds[j - 1] {
            inds.swap(j, j - 1);
            vals.swap(j, j - 1);
            j -= 1;
        }
    }
}

/// Ranking order: weight descending, then id ascending.
/// NaN weights sort last.
#[inline]
pub fn rank_cmp<K: Ord>(a: &(K, f32), b: &(K, f32)) -> Ordering {
    match (a.1.is_nan(), b.1.is_nan()) {
        (true, true) => a.0.cmp(&b.0),
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)),
    }
}

/// Sort pairs in ranking order
pub fn rank_desc<K: Ord>(items: &mut [(K, f32)]) {
    items.sort_unstable_by(rank_cmp);
}

/// Top `k` pairs in ranking order without sorting the whole input
pub fn top_k_desc<K: Ord>(mut items: Vec<(K, f32)>, k: usize) -> Vec<(K, f32)> {
    if k == 0 {
        return Vec::new();
    }
    if items.len() > k {
        items.select_nth_unstable_by(k - 1, rank_cmp);
        items.truncate(k);
    }
    rank_desc(&mut items);
    items
}
