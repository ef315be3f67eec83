// SPDX-License-Identifier: MIT

//! Space recovery under churn: fill, delete, rewrite, and make sure the
//! allocator keeps finding pages because reclamation keeps erasing sectors.

use sffs::prelude::*;

// 8 sectors of 4 KiB: 120 data pages, one of which holds the master page,
// and one sector's worth (15) stays in reserve.
const CAPACITY: usize = 32 * 1024;

fn format_and_mount(image: &mut [u8]) -> SffsFs<MemFlash<'_>> {
    let mut flash = MemFlash::new(image);
    SffsFs::<MemFlash>::format(&mut flash, "reclaim").unwrap();
    SffsFs::mount(flash).unwrap()
}

fn read_all<F: Flash>(fs: &mut SffsFs<F>, file_id: u16) -> Vec<u8> {
    let size = fs.file_size(file_id).unwrap() as usize;
    let mut f = fs.open_id(file_id, OpenMode::Read).unwrap();
    let mut out = vec![0u8; size];
    assert_eq!(fs.read(&mut f, &mut out).unwrap(), size);
    out
}

fn pattern(id: u16, len: usize) -> Vec<u8> {
    (0..len).map(|i| (i as u16 * 31 + id * 7) as u8).collect()
}

#[test]
fn test_delete_then_refill() {
    let mut image = vec![0xFFu8; CAPACITY];
    let mut fs = format_and_mount(&mut image);

    // ~90% of the user capacity in 1 KiB files (4 pages each).
    let ids: Vec<u16> = (1..=23).collect();
    for &id in &ids {
        let mut f = fs.open_id(id, OpenMode::Overwrite).unwrap();
        fs.write(&mut f, &pattern(id, 1024)).unwrap();
    }

    // Delete every other file, then write new files into the freed space.
    for &id in ids.iter().step_by(2) {
        fs.file_remove(id).unwrap();
    }
    for &id in ids.iter().step_by(2) {
        let mut f = fs.open_id(id + 100, OpenMode::Overwrite).unwrap();
        fs.write(&mut f, &pattern(id + 100, 1024)).unwrap();
    }

    // Survivors and newcomers all read back.
    for &id in ids.iter().skip(1).step_by(2) {
        assert_eq!(read_all(&mut fs, id), pattern(id, 1024));
    }
    for &id in ids.iter().step_by(2) {
        assert_eq!(read_all(&mut fs, id + 100), pattern(id + 100, 1024));
    }

    let report = Checker::new(&mut fs).check_all().unwrap();
    assert!(!report.has_error(), "{:?}", report.findings);
}

#[test]
fn test_rewrite_churn_forces_erases() {
    let mut image = vec![0xFFu8; CAPACITY];
    let mut inner = MemFlash::new(&mut image);
    {
        let mut counted = CountingFlash::new(&mut inner);
        SffsFs::<CountingFlash<MemFlash>>::format(&mut counted, "churn").unwrap();
    }
    let counted = CountingFlash::new(&mut inner);
    let mut fs = SffsFs::mount(counted).unwrap();

    // 300 single-page rewrites dirty far more pages than the device has;
    // without reclamation the allocator would run dry after ~100.
    let mut f = fs.open_id(1, OpenMode::Overwrite).unwrap();
    for round in 0..300u32 {
        let data = pattern((round % 251) as u16, 200);
        fs.write_pos(&mut f, &data, 0).unwrap();
        if round % 50 == 0 {
            assert_eq!(read_all(&mut fs, 1), data);
        }
    }

    let counted = fs.free();
    assert!(
        counted.stats.sector_erases > 10,
        "churn never triggered reclamation ({} erases)",
        counted.stats.sector_erases
    );
}

#[test]
fn test_no_space_is_clean() {
    let mut image = vec![0xFFu8; CAPACITY];
    let mut fs = format_and_mount(&mut image);

    // Single-page files until the reserve refuses the next one.
    let mut written: Vec<u16> = Vec::new();
    let mut id = 1u16;
    loop {
        let mut f = fs.open_id(id, OpenMode::Overwrite).unwrap();
        match fs.write(&mut f, &pattern(id, 200)) {
            Ok(()) => {
                written.push(id);
                id += 1;
            }
            Err(FsError::NoSpace) => break,
            Err(e) => panic!("unexpected error: {e}"),
        }
        assert!(id < 200, "device never filled up");
    }

    // Nothing that was reported written is lost or damaged.
    for &id in &written {
        assert_eq!(read_all(&mut fs, id), pattern(id, 200));
    }
    let report = Checker::new(&mut fs).check_all().unwrap();
    assert!(!report.has_error(), "{:?}", report.findings);

    // Freeing one file makes room again.
    fs.file_remove(written[0]).unwrap();
    let mut f = fs.open_id(999, OpenMode::Overwrite).unwrap();
    fs.write(&mut f, &pattern(999, 200)).unwrap();
    assert_eq!(read_all(&mut fs, 999), pattern(999, 200));
}

#[test]
fn test_reclaimed_state_survives_remount() {
    let mut image = vec![0xFFu8; CAPACITY];
    {
        let mut fs = format_and_mount(&mut image);
        let mut f = fs.open_id(1, OpenMode::Overwrite).unwrap();
        for round in 0..100u32 {
            fs.write_pos(&mut f, &pattern(round as u16, 300), 0).unwrap();
        }
    }

    let mut fs = SffsFs::mount(MemFlash::new(&mut image)).unwrap();
    assert_eq!(read_all(&mut fs, 1), pattern(99, 300));
    let report = Checker::new(&mut fs).check_all().unwrap();
    assert!(!report.has_error(), "{:?}", report.findings);
}
