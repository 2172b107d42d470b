/// 构建后缀数组（前缀倍增，每轮按 (rank[i], rank[i+k]) 排序，O(n log² n)）。
/// 输入为数值化文本（0:$,1:A,2:C,3:G,4:T,5:N），末尾应为唯一的哨兵 0。
/// 返回值为文本位置，使用 u64 以容纳正反链拼接后超过 4G 的参考。
pub fn build_sa(text: &[u8]) -> Vec<u64> {
    let n = text.len();
    if n == 0 {
        return Vec::new();
    }
    let mut sa: Vec<usize> = (0..n).collect();
    let mut rank: Vec<usize> = text.iter().map(|&b| b as usize).collect();
    let mut next: Vec<usize> = vec![0; n];

    // 第二关键字越界时取 0，其余 rank 整体 +1，保证越界后缀排在前面
    let key = |rank: &[usize], i: usize, k: usize| -> (usize, usize) {
        let second = if i + k < n { rank[i + k] + 1 } else { 0 };
        (rank[i], second)
    };

    let mut k = 1usize;
    loop {
        sa.sort_unstable_by_key(|&i| key(&rank, i, k));

        next[sa[0]] = 0;
        for w in 1..n {
            let (a, b) = (sa[w - 1], sa[w]);
            let bump = usize::from(key(&rank, a, k) != key(&rank, b, k));
            next[b] = next[a] + bump;
        }
        std::mem::swap(&mut rank, &mut next);

        if rank[sa[n - 1]] == n - 1 || k >= n {
            break;
        }
        k <<= 1;
    }

    sa.into_iter().map(|x| x as u64).collect()
}
