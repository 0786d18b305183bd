//! End-to-end tests: train, add in blocks, save, load, search on a real
//! filesystem root.

use rand::prelude::*;
use shardann::ann::AnnEngine;
use shardann::persistence::format::{self, FileKind};
use shardann::persistence::FsDirectory;
use shardann::{BlockIndex, FlatIndex, IVFPQIndex, IndexConfig, SessionState};
use std::collections::HashSet;

fn random_vectors(n: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| (0..dim).map(|_| rng.random::<f32>() * 2.0 - 1.0).collect())
        .collect()
}

fn small_config(root: &std::path::Path) -> IndexConfig {
    IndexConfig::new(8)
        .with_root(root)
        .with_num_clusters(8)
        .with_nprobe(8)
        .with_pq(4, 256)
        .with_block_size(64)
        .with_seed(42)
}

// =============================================================================
// Three vectors, two shards
// =============================================================================

#[test]
fn three_vectors_two_shards_exact_hit() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let config = IndexConfig::new(4)
        .with_root(root.path())
        .with_num_clusters(2)
        .with_pq(2, 256)
        .with_block_size(2)
        .with_seed(7);

    let v0 = vec![0.0, 0.0, 0.0, 0.0];
    let v1 = vec![1.0, 0.0, 1.0, 0.0];
    let v2 = vec![4.0, 4.0, 4.0, 4.0];
    let mut sample = vec![v0.clone(), v1.clone(), v2.clone()];
    sample.extend(random_vectors(13, 4, 1));

    let mut index: BlockIndex = BlockIndex::new(config)?;
    index.train(&sample)?;
    let ids = index.add(&[v0.clone(), v1, v2])?;
    assert_eq!(ids, vec![0, 1, 2]);
    assert_eq!(index.shard_count(), 1);
    assert_eq!(index.buffered(), 1);

    index.save()?;
    assert_eq!(index.shard_count(), 2);

    let dir = FsDirectory::new(root.path());
    let (header, shard0): (_, IVFPQIndex) =
        format::read_index(&dir, "block/shard_0.idx", FileKind::Shard)?;
    assert_eq!(header.vector_count, 2);
    let mut shard0_ids: Vec<u64> = shard0.postings().map(|(_, id, _)| id).collect();
    shard0_ids.sort_unstable();
    assert_eq!(shard0_ids, vec![0, 1]);

    let (_, shard1): (_, IVFPQIndex) =
        format::read_index(&dir, "block/shard_1.idx", FileKind::Shard)?;
    assert_eq!(shard1.postings().map(|(_, id, _)| id).collect::<Vec<_>>(), vec![2]);

    let neighbors = index.search(&[v0], 1)?;
    assert_eq!(neighbors.ids[0], vec![0]);
    assert!(neighbors.distances[0][0].abs() < 1e-5);
    Ok(())
}

// =============================================================================
// Persistence round trip
// =============================================================================

#[test]
fn save_then_load_gives_identical_results() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let data = random_vectors(600, 8, 2);
    let queries = random_vectors(20, 8, 3);

    let mut built: BlockIndex = BlockIndex::new(small_config(root.path()))?;
    built.train(&data[..400])?;
    for chunk in data.chunks(50) {
        built.add(chunk)?;
    }
    built.save()?;
    let before = built.search(&queries, 10)?;

    let mut loaded: BlockIndex = BlockIndex::new(small_config(root.path()))?;
    loaded.load()?;
    assert_eq!(loaded.state(), SessionState::Loaded);
    assert_eq!(loaded.ntotal(), 600);

    let after = loaded.search(&queries, 10)?;
    assert_eq!(before.ids, after.ids);
    for (a, b) in before.distances.iter().flatten().zip(after.distances.iter().flatten()) {
        assert!((a - b).abs() < 1e-5);
    }
    Ok(())
}

#[test]
fn loaded_index_probes_as_configured() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let data = random_vectors(200, 8, 9);

    let mut built: BlockIndex = BlockIndex::new(small_config(root.path()))?;
    built.train(&data)?;
    built.add(&data)?;
    built.save()?;
    let exhaustive = built.search(&data[..1], 200)?;
    assert_eq!(exhaustive.ids[0].len(), 200);

    let mut loaded: BlockIndex = BlockIndex::new(small_config(root.path()).with_nprobe(1))?;
    loaded.load()?;
    let engine = loaded.engine().expect("loaded index");
    assert_eq!(engine.params().nprobe, 1);
    let largest = engine.list_sizes().into_iter().max().unwrap_or(0);

    let narrow = loaded.search(&data[..1], 200)?;
    assert!(narrow.ids[0].len() <= largest);
    assert!(narrow.ids[0].len() < 200);
    Ok(())
}

#[test]
fn shard_files_match_block_count() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let data = random_vectors(200, 8, 4);

    let mut index: BlockIndex = BlockIndex::new(small_config(root.path()))?;
    index.train(&data)?;
    index.add(&data)?;
    index.save()?;

    // 200 = 3 * 64 + 8
    let mut shards: Vec<String> = std::fs::read_dir(root.path().join("block"))?
        .map(|e| e.map(|e| e.file_name().to_string_lossy().into_owned()))
        .collect::<Result<_, _>>()?;
    shards.sort();
    assert_eq!(
        shards,
        vec!["shard_0.idx", "shard_1.idx", "shard_2.idx", "shard_3.idx"]
    );
    assert!(root.path().join("trained_index.idx").exists());
    assert!(root.path().join("index.idx").exists());
    assert_eq!(index.ntotal(), 200);
    Ok(())
}

#[test]
fn every_identifier_survives_the_merge() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let data = random_vectors(300, 8, 5);

    let mut index: BlockIndex = BlockIndex::new(small_config(root.path()))?;
    index.train(&data)?;
    index.add(&data)?;
    index.save()?;

    let engine = index.engine().expect("finalized index");
    let ids: HashSet<u64> = engine.postings().map(|(_, id, _)| id).collect();
    assert_eq!(ids.len(), 300);
    assert_eq!(ids, (0..300).collect::<HashSet<u64>>());
    assert_eq!(engine.list_sizes().iter().sum::<usize>(), 300);
    Ok(())
}

// =============================================================================
// Search quality
// =============================================================================

#[test]
fn ivf_pq_recall_against_flat() -> anyhow::Result<()> {
    let data = random_vectors(1000, 8, 6);
    let queries = random_vectors(30, 8, 7);
    let k = 10;

    let flat_root = tempfile::tempdir()?;
    let mut flat: BlockIndex<FlatIndex> = BlockIndex::new(small_config(flat_root.path()))?;
    flat.train(&data)?;
    flat.add(&data)?;
    flat.save()?;

    let ivf_root = tempfile::tempdir()?;
    let mut ivf: BlockIndex = BlockIndex::new(small_config(ivf_root.path()))?;
    ivf.train(&data)?;
    ivf.add(&data)?;
    ivf.save()?;

    let truth = flat.search(&queries, k)?;
    let approx = ivf.search(&queries, k)?;

    let mut hits = 0;
    for (t, a) in truth.ids.iter().zip(&approx.ids) {
        let t: HashSet<_> = t.iter().collect();
        hits += a.iter().filter(|id| t.contains(id)).count();
    }
    let recall = hits as f32 / (queries.len() * k) as f32;
    assert!(recall >= 0.5, "recall@{k} = {recall}");
    Ok(())
}

#[test]
fn flat_engine_finds_members_exactly() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let data = random_vectors(100, 8, 8);

    let mut index: BlockIndex<FlatIndex> = BlockIndex::new(small_config(root.path()))?;
    index.train(&data[..1])?;
    index.add(&data)?;
    index.save()?;

    let neighbors = index.search(&data[..10], 1)?;
    for (i, (ids, dists)) in neighbors.ids.iter().zip(&neighbors.distances).enumerate() {
        assert_eq!(ids, &vec![i as u64]);
        assert_eq!(dists[0], 0.0);
    }
    assert_eq!(index.engine().map(AnnEngine::ntotal), Some(100));
    Ok(())
}
