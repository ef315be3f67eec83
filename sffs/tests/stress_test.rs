// SPDX-License-Identifier: MIT

//! Seeded random workload over many files: rewrite, delete, size-check,
//! verify. The model tracks what every successful write promised; nothing
//! may ever disagree with it, including after a final remount.

use std::collections::HashMap;

use rand::{rngs::StdRng, Rng, RngCore, SeedableRng};
use sffs::prelude::*;

const CAPACITY: usize = 1024 * 1024;
const FILE_COUNT: u16 = 30;
const ITERATIONS: u32 = 2000;

fn read_all<F: Flash>(fs: &mut SffsFs<F>, file_id: u16) -> Vec<u8> {
    let size = fs.file_size(file_id).unwrap() as usize;
    let mut f = fs.open_id(file_id, OpenMode::Read).unwrap();
    let mut out = vec![0u8; size];
    assert_eq!(fs.read(&mut f, &mut out).unwrap(), size);
    out
}

fn random_content(rng: &mut StdRng) -> Vec<u8> {
    let len = rng.gen_range(500..=1500);
    let mut data = vec![0u8; len];
    rng.fill_bytes(&mut data);
    data
}

fn rewrite<F: Flash>(fs: &mut SffsFs<F>, id: u16, data: &[u8]) {
    // Remove first so stale tail blocks never linger past the new length.
    match fs.file_remove(id) {
        Ok(()) | Err(FsError::NotFound) => {}
        Err(e) => panic!("remove failed: {e}"),
    }
    let mut f = fs.open_id(id, OpenMode::Overwrite).unwrap();
    fs.write(&mut f, data).unwrap();
}

#[test]
fn test_random_workload_never_corrupts() {
    let mut image = vec![0xFFu8; CAPACITY];
    let mut rng = StdRng::seed_from_u64(0x5FF5_0001);
    let mut model: HashMap<u16, Vec<u8>> = HashMap::new();

    {
        let mut flash = MemFlash::new(&mut image);
        SffsFs::<MemFlash>::format(&mut flash, "stress").unwrap();
        let mut fs = SffsFs::mount(flash).unwrap();

        for id in 1..=FILE_COUNT {
            let data = random_content(&mut rng);
            rewrite(&mut fs, id, &data);
            model.insert(id, data);
        }

        for iter in 0..ITERATIONS {
            let id = rng.gen_range(1..=FILE_COUNT);
            match rng.gen_range(0..10) {
                0 => {
                    let data = random_content(&mut rng);
                    rewrite(&mut fs, id, &data);
                    model.insert(id, data);
                }
                1 => match model.remove(&id) {
                    Some(_) => fs.file_remove(id).unwrap(),
                    None => assert_eq!(fs.file_remove(id), Err(FsError::NotFound)),
                },
                2 => match model.get(&id) {
                    Some(data) => {
                        assert_eq!(fs.file_size(id).unwrap() as usize, data.len(), "iter {iter}")
                    }
                    None => assert_eq!(fs.file_size(id), Err(FsError::NotFound)),
                },
                _ => match model.get(&id) {
                    Some(data) => assert_eq!(&read_all(&mut fs, id), data, "iter {iter}"),
                    None => assert!(matches!(
                        fs.open_id(id, OpenMode::Read),
                        Err(FsError::NotFound)
                    )),
                },
            }
        }

        let report = Checker::new(&mut fs).check_all().unwrap();
        assert!(!report.has_error(), "{:?}", report.findings);
    }

    // Everything still holds after a power cycle.
    let mut fs = SffsFs::mount(MemFlash::new(&mut image)).unwrap();
    for (&id, data) in &model {
        assert_eq!(&read_all(&mut fs, id), data, "file {id} after remount");
    }
    let report = Checker::new(&mut fs).check_all().unwrap();
    assert!(!report.has_error(), "{:?}", report.findings);
}

#[test]
fn test_workload_is_deterministic_per_seed() {
    // Two runs with the same seed must end in byte-identical images: the
    // filesystem has no hidden nondeterminism (scan order is fixed).
    let run = || {
        let mut image = vec![0xFFu8; CAPACITY];
        let mut rng = StdRng::seed_from_u64(7);
        {
            let mut flash = MemFlash::new(&mut image);
            SffsFs::<MemFlash>::format(&mut flash, "det").unwrap();
            let mut fs = SffsFs::mount(flash).unwrap();
            for _ in 0..200 {
                let id = rng.gen_range(1..=10u16);
                let data = random_content(&mut rng);
                rewrite(&mut fs, id, &data);
            }
        }
        image
    };
    assert_eq!(run(), run());
}
