//! Thin manual-exercise binary: create a disk image, partition it, format
//! a partition and drive a couple of filesystem operations. This is not a
//! full command dispatcher, just enough to poke the library from a shell.

use vfdisk::disk::Disk;
use vfdisk::fs::{format, Filesystem};
use vfdisk::mbr::Fit;
use vfdisk::mount::MountRegistry;
use vfdisk::partition::PartitionEngine;
use vfdisk::session::SessionManager;

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run() -> vfdisk::Result<()> {
    let mut args = std::env::args().skip(1);
    let path = args.next().unwrap_or_else(|| "disk.img".to_string());
    let size: u64 = args
        .next()
        .and_then(|s| s.parse().ok())
        .unwrap_or(10 * 1024 * 1024);

    let mut disk = Disk::create(&path, size)?;
    PartitionEngine::init_disk(&mut disk, 1, Fit::First)?;
    PartitionEngine::create_primary(&mut disk, "part1", (size / 2) as i64, Fit::First)?;
    let parts = PartitionEngine::list(&mut disk)?;
    let part = parts.first().expect("just created");

    let layout = format::format(&mut disk, part.start, part.size, 3)?;
    let fs = Filesystem {
        partition_start: part.start,
        sb: layout.sb,
    };

    println!("created {path} ({size} bytes)");
    println!("partition {} at offset {} size {}", part.name, part.start, part.size);
    println!(
        "formatted: {} inodes, {} blocks, {} journal slots",
        layout.inodes_count, layout.blocks_count, layout.journal_slots
    );

    let mut registry = MountRegistry::new("99");
    let mount_id = registry.mount(&mut disk, std::path::PathBuf::from(&path), &part.name)?;
    println!("mounted {} as {mount_id}", part.name);

    let creds = vfdisk::fs::ops::login(&fs, &mut disk, "root", "123")?;
    let mut session = SessionManager::new();
    session.login(&mount_id, &creds.user, &creds.group, creds.uid, creds.gid)?;
    let active = session.current()?;
    println!("logged in as {} (uid={}, gid={})", active.user, active.uid, active.gid);

    let entries = vfdisk::fs::ops::ls(&fs, &mut disk, "/", active.uid, active.gid)?;
    println!("root entries: {entries:?}");
    Ok(())
}
