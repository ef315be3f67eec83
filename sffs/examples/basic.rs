// SPDX-License-Identifier: MIT

use sffs::prelude::*;

fn main() {
    let mut image = vec![0xFFu8; 64 * 1024];
    let mut flash = MemFlash::new(&mut image);

    SffsFs::<MemFlash>::format(&mut flash, "demo").expect("format failed");
    let mut fs = SffsFs::mount(flash).expect("mount failed");

    let mut f = fs.open_id(42, OpenMode::Overwrite).unwrap();
    fs.write(&mut f, b"hello from a log-structured flash filesystem")
        .unwrap();
    fs.close(f).unwrap();

    let mut f = fs.open_id(42, OpenMode::Read).unwrap();
    let mut buf = [0u8; 64];
    let n = fs.read(&mut f, &mut buf).unwrap();
    println!("file 42 ({} bytes): {}", n, String::from_utf8_lossy(&buf[..n]));

    println!("\nsector map:\n{}", fs.debug_map().unwrap());
}
