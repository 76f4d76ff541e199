//! Directory and file operations: `mkdir`, `mkfile`, `cat`, `edit`,
//! `remove`, `rename`, `move`, `copy`, `find`, `chmod`, `chown`, `chgrp`,
//! `ls` and `tree`, plus the `users.txt`-backed group/user management
//! commands.
//!
//! Root is **not** exempted from the base read/write/remove checks; only
//! the operations explicitly named below require an active root session.

use regex::Regex;

use crate::disk::Disk;
use crate::error::{Error, Result};
use crate::fs::block::DirBlock;
use crate::fs::inode::{Inode, DIRECT_POINTERS, TYPE_DIR, TYPE_FILE};
use crate::fs::perm::{self, Access};
use crate::fs::{path, Filesystem};
use crate::users;

const DEFAULT_DIR_PERM: i32 = 775;
const DEFAULT_FILE_PERM: i32 = 664;

/// Content to give a newly created file: either bytes supplied by the
/// caller, or a synthesized buffer of `size` bytes following the
/// `'0' + i mod 10` repeating-digit pattern.
pub enum FileContent<'a> {
    Bytes(&'a [u8]),
    Synthesized(usize),
}

impl FileContent<'_> {
    fn materialize(&self) -> Vec<u8> {
        match self {
            FileContent::Bytes(b) => b.to_vec(),
            FileContent::Synthesized(size) => (0..*size).map(|i| b'0' + (i % 10) as u8).collect(),
        }
    }
}

/// Joins a directory path and a child name into an absolute path string.
fn join_path(base: &str, name: &str) -> String {
    if base == "/" {
        format!("/{name}")
    } else {
        format!("{base}/{name}")
    }
}

/// Blocks used by a directory or file inode, in on-disk order.
fn used_blocks(inode: &Inode) -> Vec<i32> {
    inode.block[..DIRECT_POINTERS]
        .iter()
        .copied()
        .take_while(|&b| b >= 0)
        .collect()
}

fn list_entries(
    fs: &Filesystem,
    disk: &mut Disk,
    dir_inode: &Inode,
) -> Result<Vec<(i32, usize, crate::fs::block::DirEntry)>> {
    let mut out = Vec::new();
    for &blk in &used_blocks(dir_inode) {
        let buf = fs.read_block(disk, blk)?;
        let dirblock = DirBlock::decode(&buf)?;
        for (slot, entry) in dirblock.entries.iter().enumerate() {
            if !entry.is_free() {
                out.push((blk, slot, entry.clone()));
            }
        }
    }
    Ok(out)
}

fn find_in_dir(fs: &Filesystem, disk: &mut Disk, dir_inode: &Inode, name: &str) -> Result<Option<i32>> {
    for (_, _, entry) in list_entries(fs, disk, dir_inode)? {
        if entry.name_str() == name {
            return Ok(Some(entry.inode));
        }
    }
    Ok(None)
}

fn add_entry(
    fs: &mut Filesystem,
    disk: &mut Disk,
    dir_idx: i32,
    dir_inode: &mut Inode,
    name: &str,
    child_idx: i32,
) -> Result<()> {
    for &blk in &used_blocks(dir_inode) {
        let buf = fs.read_block(disk, blk)?;
        let mut dirblock = DirBlock::decode(&buf)?;
        if let Some(slot) = dirblock.free_slot() {
            dirblock.entries[slot].set_name(name)?;
            dirblock.entries[slot].inode = child_idx;
            fs.write_block(disk, blk, &dirblock.encode())?;
            return Ok(());
        }
    }

    let used = used_blocks(dir_inode).len();
    if used >= DIRECT_POINTERS {
        return Err(Error::capacity("directory is full"));
    }
    let new_blk = fs.alloc_block(disk)?;
    let mut dirblock = DirBlock::empty();
    dirblock.entries[0].set_name(name)?;
    dirblock.entries[0].inode = child_idx;
    fs.write_block(disk, new_blk, &dirblock.encode())?;
    dir_inode.block[used] = new_blk;
    dir_inode.size += fs.sb.block_size;
    fs.write_inode(disk, dir_idx, dir_inode)?;
    Ok(())
}

fn remove_entry(fs: &mut Filesystem, disk: &mut Disk, dir_inode: &Inode, name: &str) -> Result<i32> {
    for &blk in &used_blocks(dir_inode) {
        let buf = fs.read_block(disk, blk)?;
        let mut dirblock = DirBlock::decode(&buf)?;
        if let Some(slot) = dirblock
            .entries
            .iter()
            .position(|e| !e.is_free() && e.name_str() == name)
        {
            let child = dirblock.entries[slot].inode;
            dirblock.entries[slot] = crate::fs::block::DirEntry::free();
            fs.write_block(disk, blk, &dirblock.encode())?;
            return Ok(child);
        }
    }
    Err(Error::not_found(format!("{name} not found")))
}

/// Frees every block and the inode itself for `idx`, recursing into
/// directory children first (skipping `.`/`..`) so a whole subtree can be
/// torn down bottom-up.
fn free_subtree(fs: &mut Filesystem, disk: &mut Disk, idx: i32, inode: &Inode) -> Result<()> {
    if inode.is_dir() {
        for (_, _, entry) in list_entries(fs, disk, inode)? {
            let name = entry.name_str();
            if name == "." || name == ".." {
                continue;
            }
            let child_inode = fs.read_inode(disk, entry.inode)?;
            free_subtree(fs, disk, entry.inode, &child_inode)?;
        }
    }
    for &blk in &used_blocks(inode) {
        fs.free_block(disk, blk)?;
    }
    fs.free_inode(disk, idx)
}

/// Removes `name` from `parent_inode`'s directory block and frees the whole
/// subtree it pointed at, used when a move/copy destination overwrites an
/// existing entry.
fn purge_named_entry(fs: &mut Filesystem, disk: &mut Disk, parent_inode: &Inode, name: &str) -> Result<()> {
    let child_idx = remove_entry(fs, disk, parent_inode, name)?;
    let child_inode = fs.read_inode(disk, child_idx)?;
    free_subtree(fs, disk, child_idx, &child_inode)
}

/// Which of the three destination shapes `mv`/`copy` resolved to: nesting
/// under an existing directory (keeping the source's own name), overwriting
/// an existing file, or landing on a not-yet-existing leaf under an existing
/// parent.
enum DestKind {
    IntoDir,
    Overwrite,
    NewLeaf,
}

struct Destination {
    parent_idx: i32,
    parent_inode: Inode,
    name: String,
    kind: DestKind,
}

/// Resolves a `mv`/`copy` destination path per spec's 3-way rule: an
/// existing directory (entry keeps `src_basename`), an existing file (it is
/// overwritten), or a non-existent leaf under an existing parent directory.
fn resolve_destination(
    fs: &Filesystem,
    disk: &mut Disk,
    src_basename: &str,
    dest_path: &str,
) -> Result<Destination> {
    match resolve(fs, disk, dest_path) {
        Ok((idx, inode)) if inode.is_dir() => Ok(Destination {
            parent_idx: idx,
            parent_inode: inode,
            name: src_basename.to_string(),
            kind: DestKind::IntoDir,
        }),
        Ok(_) => {
            let (parent_path, name) = path::split_parent(dest_path)?;
            let (parent_idx, parent_inode) = resolve_dir(fs, disk, &parent_path)?;
            Ok(Destination {
                parent_idx,
                parent_inode,
                name,
                kind: DestKind::Overwrite,
            })
        }
        Err(Error::NotFound(_)) => {
            let (parent_path, name) = path::split_parent(dest_path)?;
            let (parent_idx, parent_inode) = resolve_dir(fs, disk, &parent_path)?;
            Ok(Destination {
                parent_idx,
                parent_inode,
                name,
                kind: DestKind::NewLeaf,
            })
        }
        Err(e) => Err(e),
    }
}

/// Resolves an absolute path to its inode index and decoded inode.
pub fn resolve(fs: &Filesystem, disk: &mut Disk, path: &str) -> Result<(i32, Inode)> {
    let mut idx = crate::fs::superblock::ROOT_INODE;
    let mut inode = fs.read_inode(disk, idx)?;
    for comp in path::components(path)? {
        if !inode.is_dir() {
            return Err(Error::validation(format!("{comp} is not a directory")));
        }
        let child = find_in_dir(fs, disk, &inode, comp)?
            .ok_or_else(|| Error::not_found(format!("{path} not found")))?;
        idx = child;
        inode = fs.read_inode(disk, idx)?;
    }
    Ok((idx, inode))
}

fn resolve_dir(fs: &Filesystem, disk: &mut Disk, path: &str) -> Result<(i32, Inode)> {
    let (idx, inode) = resolve(fs, disk, path)?;
    if !inode.is_dir() {
        return Err(Error::validation(format!("{path} is not a directory")));
    }
    Ok((idx, inode))
}

fn read_file_content(fs: &Filesystem, disk: &mut Disk, inode: &Inode) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(inode.size.max(0) as usize);
    for &blk in &used_blocks(inode) {
        out.extend_from_slice(&fs.read_block(disk, blk)?);
    }
    out.truncate(inode.size.max(0) as usize);
    Ok(out)
}

fn write_file_content(
    fs: &mut Filesystem,
    disk: &mut Disk,
    inode_idx: i32,
    inode: &mut Inode,
    content: &[u8],
) -> Result<()> {
    let block_size = fs.sb.block_size as usize;
    let needed = crate::util::ceil_div(content.len() as u64, block_size as u64) as usize;
    if needed > DIRECT_POINTERS {
        return Err(Error::capacity("file too large for direct block pointers"));
    }
    let existing = used_blocks(inode).len();

    for i in 0..needed {
        if inode.block[i] < 0 {
            inode.block[i] = fs.alloc_block(disk)?;
        }
        let start = i * block_size;
        let end = ((i + 1) * block_size).min(content.len());
        fs.write_block(disk, inode.block[i], &content[start..end])?;
    }
    for i in needed..existing {
        let blk = inode.block[i];
        inode.block[i] = -1;
        fs.free_block(disk, blk)?;
    }

    inode.size = content.len() as i32;
    inode.mtime = crate::util::timestamp();
    fs.write_inode(disk, inode_idx, inode)
}

/// Creates a directory for a single parent/name pair; shared by `mkdir`'s
/// per-component loop.
fn mkdir_one(
    fs: &mut Filesystem,
    disk: &mut Disk,
    parent_idx: i32,
    parent_inode: &mut Inode,
    name: &str,
    uid: i32,
    gid: i32,
) -> Result<i32> {
    let child_idx = fs.alloc_inode(disk)?;
    let child_blk = fs.alloc_block(disk)?;
    let now = crate::util::timestamp();
    let mut child = Inode::free();
    child.uid = uid;
    child.gid = gid;
    child.inode_type = TYPE_DIR;
    child.perm = DEFAULT_DIR_PERM;
    child.atime = now;
    child.ctime = now;
    child.mtime = now;
    child.block[0] = child_blk;
    child.size = fs.sb.block_size;

    let mut dirblock = DirBlock::empty();
    dirblock.entries[0].set_name(".")?;
    dirblock.entries[0].inode = child_idx;
    dirblock.entries[1].set_name("..")?;
    dirblock.entries[1].inode = parent_idx;
    fs.write_block(disk, child_blk, &dirblock.encode())?;
    fs.write_inode(disk, child_idx, &child)?;

    add_entry(fs, disk, parent_idx, parent_inode, name, child_idx)?;
    Ok(child_idx)
}

/// Creates the directory at `path`. With `parents` set, missing intermediate
/// directories are created along the way (`mkdir -p`); without it, a missing
/// intermediate directory is a `NotFound` error. The final component is
/// always created if it does not already exist.
pub fn mkdir(fs: &mut Filesystem, disk: &mut Disk, path: &str, uid: i32, gid: i32, parents: bool) -> Result<()> {
    let components = path::components(path)?;
    if components.is_empty() {
        return Err(Error::validation("cannot create the root directory"));
    }

    let mut parent_idx = crate::fs::superblock::ROOT_INODE;
    let mut parent_inode = fs.read_inode(disk, parent_idx)?;
    let mut current = String::new();

    for (i, comp) in components.iter().enumerate() {
        current = join_path(&current_or_root(&current), comp);
        let is_last = i == components.len() - 1;

        match find_in_dir(fs, disk, &parent_inode, comp)? {
            Some(child_idx) => {
                let child_inode = fs.read_inode(disk, child_idx)?;
                if is_last {
                    return Err(Error::conflict(format!("{path} already exists")));
                }
                if !child_inode.is_dir() {
                    return Err(Error::validation(format!("{comp} is not a directory")));
                }
                parent_idx = child_idx;
                parent_inode = child_inode;
            }
            None => {
                if !is_last && !parents {
                    return Err(Error::not_found(format!("{current} not found")));
                }
                if !perm::allowed(&parent_inode, uid, gid, Access::Write) {
                    return Err(Error::permission(format!("cannot write to parent of {current}")));
                }
                let child_idx = mkdir_one(fs, disk, parent_idx, &mut parent_inode, comp, uid, gid)?;
                parent_idx = child_idx;
                parent_inode = fs.read_inode(disk, child_idx)?;
            }
        }
    }

    fs.log(disk, "mkdir", path, "")
}

/// Helper for `mkdir`'s progress-path messages: `""` means "/" so far.
fn current_or_root(current: &str) -> String {
    if current.is_empty() {
        "/".to_string()
    } else {
        current.to_string()
    }
}

pub fn mkfile(
    fs: &mut Filesystem,
    disk: &mut Disk,
    path: &str,
    uid: i32,
    gid: i32,
    content: FileContent,
    parents: bool,
) -> Result<()> {
    let (parent_path, name) = path::split_parent(path)?;
    if parents && resolve_dir(fs, disk, &parent_path).is_err() {
        mkdir(fs, disk, &parent_path, uid, gid, true)?;
    }
    let (parent_idx, mut parent_inode) = resolve_dir(fs, disk, &parent_path)?;
    if !perm::allowed(&parent_inode, uid, gid, Access::Write) {
        return Err(Error::permission(format!("cannot write to {parent_path}")));
    }
    if find_in_dir(fs, disk, &parent_inode, &name)?.is_some() {
        return Err(Error::conflict(format!("{path} already exists")));
    }

    let bytes = content.materialize();
    let child_idx = fs.alloc_inode(disk)?;
    let now = crate::util::timestamp();
    let mut child = Inode::free();
    child.uid = uid;
    child.gid = gid;
    child.inode_type = TYPE_FILE;
    child.perm = DEFAULT_FILE_PERM;
    child.atime = now;
    child.ctime = now;
    child.mtime = now;
    write_file_content(fs, disk, child_idx, &mut child, &bytes)?;

    add_entry(fs, disk, parent_idx, &mut parent_inode, &name, child_idx)?;
    fs.log(disk, "mkfile", path, &String::from_utf8_lossy(&bytes))
}

pub fn cat(fs: &Filesystem, disk: &mut Disk, path: &str, uid: i32, gid: i32) -> Result<Vec<u8>> {
    let (_, inode) = resolve(fs, disk, path)?;
    if inode.is_dir() {
        return Err(Error::validation(format!("{path} is a directory")));
    }
    if !perm::allowed(&inode, uid, gid, Access::Read) {
        return Err(Error::permission(format!("cannot read {path}")));
    }
    read_file_content(fs, disk, &inode)
}

pub fn edit(
    fs: &mut Filesystem,
    disk: &mut Disk,
    path: &str,
    uid: i32,
    gid: i32,
    content: &[u8],
) -> Result<()> {
    let (idx, mut inode) = resolve(fs, disk, path)?;
    if inode.is_dir() {
        return Err(Error::validation(format!("{path} is a directory")));
    }
    if !perm::allowed(&inode, uid, gid, Access::Write) {
        return Err(Error::permission(format!("cannot write {path}")));
    }
    write_file_content(fs, disk, idx, &mut inode, content)?;
    fs.log(disk, "edit", path, &String::from_utf8_lossy(content))
}

pub fn remove(fs: &mut Filesystem, disk: &mut Disk, path: &str, uid: i32, gid: i32) -> Result<()> {
    let (parent_path, name) = path::split_parent(path)?;
    let (_, parent_inode) = resolve_dir(fs, disk, &parent_path)?;
    if !perm::allowed(&parent_inode, uid, gid, Access::Write) {
        return Err(Error::permission(format!("cannot write to {parent_path}")));
    }

    let child_idx = remove_entry(fs, disk, &parent_inode, &name)?;
    let child_inode = fs.read_inode(disk, child_idx)?;
    free_subtree(fs, disk, child_idx, &child_inode)?;
    fs.log(disk, "remove", path, "")
}

pub fn rename(
    fs: &mut Filesystem,
    disk: &mut Disk,
    path: &str,
    new_name: &str,
    uid: i32,
    gid: i32,
) -> Result<()> {
    let (parent_path, old_name) = path::split_parent(path)?;
    let (parent_idx, mut parent_inode) = resolve_dir(fs, disk, &parent_path)?;
    if !perm::allowed(&parent_inode, uid, gid, Access::Write) {
        return Err(Error::permission(format!("cannot write to {parent_path}")));
    }
    if find_in_dir(fs, disk, &parent_inode, new_name)?.is_some() {
        return Err(Error::conflict(format!("{new_name} already exists")));
    }
    let child_idx = remove_entry(fs, disk, &parent_inode, &old_name)?;
    add_entry(fs, disk, parent_idx, &mut parent_inode, new_name, child_idx)?;
    fs.log(disk, "rename", path, new_name)
}

/// Moves `src_path` to `dest_path`, resolved per the shared 3-way rule: an
/// existing directory nests the source under its own name, an existing file
/// is overwritten, and a non-existent leaf under an existing parent becomes
/// the new name.
pub fn mv(fs: &mut Filesystem, disk: &mut Disk, src_path: &str, dest_path: &str, uid: i32, gid: i32) -> Result<()> {
    let (src_parent_path, src_name) = path::split_parent(src_path)?;
    let (_, src_parent_inode) = resolve_dir(fs, disk, &src_parent_path)?;
    if !perm::allowed(&src_parent_inode, uid, gid, Access::Write) {
        return Err(Error::permission(format!("cannot write to {src_parent_path}")));
    }

    let dest = resolve_destination(fs, disk, &src_name, dest_path)?;
    if !perm::allowed(&dest.parent_inode, uid, gid, Access::Write) {
        return Err(Error::permission("cannot write to destination"));
    }
    if matches!(dest.kind, DestKind::Overwrite) {
        purge_named_entry(fs, disk, &dest.parent_inode, &dest.name)?;
    }

    let child_idx = remove_entry(fs, disk, &src_parent_inode, &src_name)?;
    let mut dest_parent_inode = fs.read_inode(disk, dest.parent_idx)?;
    add_entry(fs, disk, dest.parent_idx, &mut dest_parent_inode, &dest.name, child_idx)?;
    fs.log(disk, "move", src_path, dest_path)
}

/// Recursively copies the entry at `src_idx`/`src_inode` into `dest_parent`
/// under `dest_name`, descending into directories and duplicating file
/// content block by block.
fn copy_entry(
    fs: &mut Filesystem,
    disk: &mut Disk,
    src_inode: &Inode,
    dest_parent_idx: i32,
    dest_parent_inode: &mut Inode,
    dest_name: &str,
) -> Result<()> {
    if src_inode.is_dir() {
        mkdir_one(fs, disk, dest_parent_idx, dest_parent_inode, dest_name, src_inode.uid, src_inode.gid)?;
        let new_idx = find_in_dir(fs, disk, dest_parent_inode, dest_name)?
            .ok_or_else(|| Error::integrity("copy target directory vanished"))?;
        let mut new_inode = fs.read_inode(disk, new_idx)?;
        new_inode.perm = src_inode.perm;
        fs.write_inode(disk, new_idx, &new_inode)?;

        for (_, _, entry) in list_entries(fs, disk, src_inode)? {
            let name = entry.name_str();
            if name == "." || name == ".." {
                continue;
            }
            let child_inode = fs.read_inode(disk, entry.inode)?;
            copy_entry(fs, disk, &child_inode, new_idx, &mut new_inode, &name)?;
        }
        Ok(())
    } else {
        let content = read_file_content(fs, disk, src_inode)?;
        let child_idx = fs.alloc_inode(disk)?;
        let now = crate::util::timestamp();
        let mut child = Inode::free();
        child.uid = src_inode.uid;
        child.gid = src_inode.gid;
        child.inode_type = TYPE_FILE;
        child.perm = src_inode.perm;
        child.atime = now;
        child.ctime = now;
        child.mtime = now;
        write_file_content(fs, disk, child_idx, &mut child, &content)?;
        add_entry(fs, disk, dest_parent_idx, dest_parent_inode, dest_name, child_idx)
    }
}

/// Copies `src_path` to `dest_path`. Directory sources are copied
/// recursively; the destination is resolved with the same 3-way rule as
/// `mv`.
pub fn copy(fs: &mut Filesystem, disk: &mut Disk, src_path: &str, dest_path: &str, uid: i32, gid: i32) -> Result<()> {
    let (_, src_name) = path::split_parent(src_path)?;
    let (_, src_inode) = resolve(fs, disk, src_path)?;
    if !perm::allowed(&src_inode, uid, gid, Access::Read) {
        return Err(Error::permission(format!("cannot read {src_path}")));
    }

    let dest = resolve_destination(fs, disk, &src_name, dest_path)?;
    if !perm::allowed(&dest.parent_inode, uid, gid, Access::Write) {
        return Err(Error::permission("cannot write to destination"));
    }
    if matches!(dest.kind, DestKind::Overwrite) {
        purge_named_entry(fs, disk, &dest.parent_inode, &dest.name)?;
    }

    let mut dest_parent_inode = fs.read_inode(disk, dest.parent_idx)?;
    copy_entry(fs, disk, &src_inode, dest.parent_idx, &mut dest_parent_inode, &dest.name)?;
    fs.log(disk, "copy", src_path, dest_path)
}

pub fn ls(fs: &Filesystem, disk: &mut Disk, path: &str, uid: i32, gid: i32) -> Result<Vec<String>> {
    let (_, inode) = resolve_dir(fs, disk, path)?;
    if !perm::allowed(&inode, uid, gid, Access::Read) {
        return Err(Error::permission(format!("cannot read {path}")));
    }
    Ok(list_entries(fs, disk, &inode)?
        .into_iter()
        .map(|(_, _, e)| e.name_str())
        .collect())
}

fn tree_rec(
    fs: &Filesystem,
    disk: &mut Disk,
    idx: i32,
    name: &str,
    depth: usize,
    out: &mut String,
) -> Result<()> {
    out.push_str(&"  ".repeat(depth));
    out.push_str(name);
    out.push('\n');
    let inode = fs.read_inode(disk, idx)?;
    if inode.is_dir() {
        for (_, _, entry) in list_entries(fs, disk, &inode)? {
            let n = entry.name_str();
            if n == "." || n == ".." {
                continue;
            }
            tree_rec(fs, disk, entry.inode, &n, depth + 1, out)?;
        }
    }
    Ok(())
}

pub fn tree(fs: &Filesystem, disk: &mut Disk, path: &str) -> Result<String> {
    let (idx, _) = resolve(fs, disk, path)?;
    let mut out = String::new();
    tree_rec(fs, disk, idx, path, 0, &mut out)?;
    Ok(out)
}

/// Compiles a shell glob (`*`, `?`, literal runs) directly into a regex,
/// escaping every other regex metacharacter.
fn glob_to_regex(glob: &str) -> Result<Regex> {
    let mut pattern = String::from("^");
    for c in glob.chars() {
        match c {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            '.' | '+' | '(' | ')' | '[' | ']' | '{' | '}' | '^' | '$' | '|' | '\\' => {
                pattern.push('\\');
                pattern.push(c);
            }
            c => pattern.push(c),
        }
    }
    pattern.push('$');
    Regex::new(&pattern).map_err(|e| Error::validation(format!("bad pattern: {e}")))
}

fn find_rec(
    fs: &Filesystem,
    disk: &mut Disk,
    idx: i32,
    path: &str,
    re: &Regex,
    out: &mut Vec<String>,
) -> Result<()> {
    let inode = fs.read_inode(disk, idx)?;
    if !inode.is_dir() {
        return Ok(());
    }
    for (_, _, entry) in list_entries(fs, disk, &inode)? {
        let name = entry.name_str();
        if name == "." || name == ".." {
            continue;
        }
        let child_path = if path == "/" {
            format!("/{name}")
        } else {
            format!("{path}/{name}")
        };
        if re.is_match(&name) {
            out.push(child_path.clone());
        }
        find_rec(fs, disk, entry.inode, &child_path, re, out)?;
    }
    Ok(())
}

pub fn find(fs: &Filesystem, disk: &mut Disk, root: &str, glob: &str) -> Result<Vec<String>> {
    let (idx, _) = resolve_dir(fs, disk, root)?;
    let re = glob_to_regex(glob)?;
    let mut out = Vec::new();
    find_rec(fs, disk, idx, root, &re, &mut out)?;
    Ok(out)
}

/// Applies `perm` and/or `owner` (uid, gid) to every descendant of `inode`,
/// skipping `.`/`..`, used by the `recursive` forms of `chmod`/`chown`.
fn apply_recursive(
    fs: &mut Filesystem,
    disk: &mut Disk,
    inode: &Inode,
    perm: Option<i32>,
    owner: Option<(i32, i32)>,
) -> Result<()> {
    if !inode.is_dir() {
        return Ok(());
    }
    for (_, _, entry) in list_entries(fs, disk, inode)? {
        let name = entry.name_str();
        if name == "." || name == ".." {
            continue;
        }
        let mut child_inode = fs.read_inode(disk, entry.inode)?;
        if let Some(p) = perm {
            child_inode.perm = p;
        }
        if let Some((u, g)) = owner {
            child_inode.uid = u;
            child_inode.gid = g;
        }
        fs.write_inode(disk, entry.inode, &child_inode)?;
        apply_recursive(fs, disk, &child_inode, perm, owner)?;
    }
    Ok(())
}

/// `chmod`: root-only, per the base command set's documented exception. With
/// `recursive`, also applies to every descendant of a directory.
pub fn chmod(
    fs: &mut Filesystem,
    disk: &mut Disk,
    path: &str,
    perm: i32,
    is_root: bool,
    recursive: bool,
) -> Result<()> {
    if !is_root {
        return Err(Error::permission("chmod requires root"));
    }
    let (idx, mut inode) = resolve(fs, disk, path)?;
    inode.perm = perm;
    fs.write_inode(disk, idx, &inode)?;
    if recursive {
        apply_recursive(fs, disk, &inode, Some(perm), None)?;
    }
    Ok(())
}

/// `chown`: root-only. With `recursive`, also applies to every descendant of
/// a directory.
pub fn chown(
    fs: &mut Filesystem,
    disk: &mut Disk,
    path: &str,
    uid: i32,
    gid: i32,
    is_root: bool,
    recursive: bool,
) -> Result<()> {
    if !is_root {
        return Err(Error::permission("chown requires root"));
    }
    let (idx, mut inode) = resolve(fs, disk, path)?;
    inode.uid = uid;
    inode.gid = gid;
    fs.write_inode(disk, idx, &inode)?;
    if recursive {
        apply_recursive(fs, disk, &inode, None, Some((uid, gid)))?;
    }
    Ok(())
}

/// `chgrp`: root-only; updates the inode's gid.
pub fn chgrp(fs: &mut Filesystem, disk: &mut Disk, path: &str, gid: i32, is_root: bool) -> Result<()> {
    if !is_root {
        return Err(Error::permission("chgrp requires root"));
    }
    let (idx, mut inode) = resolve(fs, disk, path)?;
    inode.gid = gid;
    fs.write_inode(disk, idx, &inode)
}

const USERS_PATH: &str = "/users.txt";

fn load_users(fs: &Filesystem, disk: &mut Disk) -> Result<Vec<users::Record>> {
    let (_, inode) = resolve(fs, disk, USERS_PATH)?;
    let content = read_file_content(fs, disk, &inode)?;
    let text = String::from_utf8_lossy(&content);
    users::parse(&text)
}

fn save_users(fs: &mut Filesystem, disk: &mut Disk, records: &[users::Record]) -> Result<()> {
    let (idx, mut inode) = resolve(fs, disk, USERS_PATH)?;
    let text = users::serialize(records);
    write_file_content(fs, disk, idx, &mut inode, text.as_bytes())
}

pub fn mkgrp(fs: &mut Filesystem, disk: &mut Disk, name: &str, is_root: bool) -> Result<i64> {
    if !is_root {
        return Err(Error::permission("mkgrp requires root"));
    }
    let mut records = load_users(fs, disk)?;
    let id = users::add_group(&mut records, name)?;
    save_users(fs, disk, &records)?;
    Ok(id)
}

pub fn rmgrp(fs: &mut Filesystem, disk: &mut Disk, name: &str, is_root: bool) -> Result<()> {
    if !is_root {
        return Err(Error::permission("rmgrp requires root"));
    }
    let mut records = load_users(fs, disk)?;
    users::remove_group(&mut records, name)?;
    save_users(fs, disk, &records)
}

pub fn mkusr(
    fs: &mut Filesystem,
    disk: &mut Disk,
    group: &str,
    name: &str,
    password: &str,
    is_root: bool,
) -> Result<i64> {
    if !is_root {
        return Err(Error::permission("mkusr requires root"));
    }
    let mut records = load_users(fs, disk)?;
    let id = users::add_user(&mut records, group, name, password)?;
    save_users(fs, disk, &records)?;
    Ok(id)
}

pub fn rmusr(fs: &mut Filesystem, disk: &mut Disk, name: &str, is_root: bool) -> Result<()> {
    if !is_root {
        return Err(Error::permission("rmusr requires root"));
    }
    let mut records = load_users(fs, disk)?;
    users::remove_user(&mut records, name)?;
    save_users(fs, disk, &records)
}

pub fn chgrp_user(
    fs: &mut Filesystem,
    disk: &mut Disk,
    user: &str,
    new_group: &str,
    is_root: bool,
) -> Result<()> {
    if !is_root {
        return Err(Error::permission("chgrp requires root"));
    }
    let mut records = load_users(fs, disk)?;
    users::change_group(&mut records, user, new_group)?;
    save_users(fs, disk, &records)
}

/// A successfully authenticated user: the numeric uid from their own user
/// record, and the numeric gid of the group their record names.
pub struct Credentials {
    pub uid: i32,
    pub gid: i32,
    pub user: String,
    pub group: String,
}

pub fn login(fs: &Filesystem, disk: &mut Disk, user: &str, password: &str) -> Result<Credentials> {
    let records = load_users(fs, disk)?;
    let record = users::authenticate(&records, user, password).ok_or_else(|| Error::permission("invalid credentials"))?;
    let (uid, group) = match record {
        users::Record::User { id, group, .. } => (*id as i32, group.clone()),
        users::Record::Group { .. } => return Err(Error::integrity("authenticate returned a group record")),
    };
    let gid = match users::find_group(&records, &group) {
        Some(users::Record::Group { id, .. }) => *id as i32,
        _ => return Err(Error::integrity(format!("group {group} not found for user {user}"))),
    };
    Ok(Credentials {
        uid,
        gid,
        user: user.to_string(),
        group,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::fs::format;
    use crate::fs::superblock::FS3;
    use std::env::temp_dir;
    use std::path::PathBuf;

    fn tmp_path(name: &str) -> PathBuf {
        let mut p = temp_dir();
        p.push(format!("vfdisk-ops-test-{}-{}", std::process::id(), name));
        p
    }

    fn setup(name: &str) -> (Disk, Filesystem, PathBuf) {
        let path = tmp_path(name);
        let mut disk = Disk::create(&path, 300_000).unwrap();
        let layout = format::format(&mut disk, 0, 300_000, FS3).unwrap();
        let fs = Filesystem {
            partition_start: 0,
            sb: layout.sb,
        };
        (disk, fs, path)
    }

    #[test]
    fn mkdir_mkfile_cat_roundtrip() {
        let (mut disk, mut fs, path) = setup("roundtrip");
        mkdir(&mut fs, &mut disk, "/docs", 1, 1, false).unwrap();
        mkfile(&mut fs, &mut disk, "/docs/a.txt", 1, 1, FileContent::Bytes(b"hello"), false).unwrap();
        let content = cat(&fs, &mut disk, "/docs/a.txt", 1, 1).unwrap();
        assert_eq!(content, b"hello");
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn mkfile_duplicate_is_conflict() {
        let (mut disk, mut fs, path) = setup("dup");
        mkfile(&mut fs, &mut disk, "/a.txt", 1, 1, FileContent::Bytes(b"x"), false).unwrap();
        let err = mkfile(&mut fs, &mut disk, "/a.txt", 1, 1, FileContent::Bytes(b"y"), false).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn mkdir_requires_parents_flag_for_missing_intermediate() {
        let (mut disk, mut fs, path) = setup("mkdir-p");
        let err = mkdir(&mut fs, &mut disk, "/a/b/c", 1, 1, false).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        mkdir(&mut fs, &mut disk, "/a/b/c", 1, 1, true).unwrap();
        assert!(resolve(&fs, &mut disk, "/a/b/c").is_ok());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn mkfile_synthesizes_content_from_size() {
        let (mut disk, mut fs, path) = setup("synth");
        mkfile(&mut fs, &mut disk, "/ten.txt", 1, 1, FileContent::Synthesized(10), false).unwrap();
        let content = cat(&fs, &mut disk, "/ten.txt", 1, 1).unwrap();
        assert_eq!(content, b"0123456789");
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn mkfile_parents_creates_missing_dirs() {
        let (mut disk, mut fs, path) = setup("mkfile-p");
        mkfile(&mut fs, &mut disk, "/a/b/c.txt", 1, 1, FileContent::Bytes(b"x"), true).unwrap();
        let content = cat(&fs, &mut disk, "/a/b/c.txt", 1, 1).unwrap();
        assert_eq!(content, b"x");
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn remove_recurses_into_nonempty_dir() {
        let (mut disk, mut fs, path) = setup("nonempty");
        mkdir(&mut fs, &mut disk, "/docs", 1, 1, false).unwrap();
        mkfile(&mut fs, &mut disk, "/docs/a.txt", 1, 1, FileContent::Bytes(b"x"), false).unwrap();
        remove(&mut fs, &mut disk, "/docs", 1, 1).unwrap();
        let err = resolve(&fs, &mut disk, "/docs").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn permission_denied_for_other_user() {
        let (mut disk, mut fs, path) = setup("perm");
        mkfile(&mut fs, &mut disk, "/secret.txt", 1, 1, FileContent::Bytes(b"x"), false).unwrap();
        chmod(&mut fs, &mut disk, "/secret.txt", 600, true, false).unwrap();
        let err = cat(&fs, &mut disk, "/secret.txt", 2, 2).unwrap_err();
        assert!(matches!(err, Error::Permission(_)));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn chmod_recursive_applies_to_children() {
        let (mut disk, mut fs, path) = setup("chmod-rec");
        mkdir(&mut fs, &mut disk, "/docs", 1, 1, false).unwrap();
        mkfile(&mut fs, &mut disk, "/docs/a.txt", 1, 1, FileContent::Bytes(b"x"), false).unwrap();
        chmod(&mut fs, &mut disk, "/docs", 700, true, true).unwrap();
        let (_, inode) = resolve(&fs, &mut disk, "/docs/a.txt").unwrap();
        assert_eq!(inode.perm, 700);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn copy_directory_recurses() {
        let (mut disk, mut fs, path) = setup("copy-dir");
        mkdir(&mut fs, &mut disk, "/src", 1, 1, false).unwrap();
        mkfile(&mut fs, &mut disk, "/src/a.txt", 1, 1, FileContent::Bytes(b"x"), false).unwrap();
        mkdir(&mut fs, &mut disk, "/dest", 1, 1, false).unwrap();
        copy(&mut fs, &mut disk, "/src", "/dest", 1, 1).unwrap();
        let content = cat(&fs, &mut disk, "/dest/src/a.txt", 1, 1).unwrap();
        assert_eq!(content, b"x");
        // original untouched
        assert!(resolve(&fs, &mut disk, "/src/a.txt").is_ok());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn mv_into_existing_dir_nests_under_basename() {
        let (mut disk, mut fs, path) = setup("mv-dir");
        mkfile(&mut fs, &mut disk, "/a.txt", 1, 1, FileContent::Bytes(b"x"), false).unwrap();
        mkdir(&mut fs, &mut disk, "/dest", 1, 1, false).unwrap();
        mv(&mut fs, &mut disk, "/a.txt", "/dest", 1, 1).unwrap();
        assert!(resolve(&fs, &mut disk, "/a.txt").is_err());
        let content = cat(&fs, &mut disk, "/dest/a.txt", 1, 1).unwrap();
        assert_eq!(content, b"x");
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn mv_overwrites_existing_file() {
        let (mut disk, mut fs, path) = setup("mv-overwrite");
        mkfile(&mut fs, &mut disk, "/a.txt", 1, 1, FileContent::Bytes(b"new"), false).unwrap();
        mkfile(&mut fs, &mut disk, "/b.txt", 1, 1, FileContent::Bytes(b"old"), false).unwrap();
        mv(&mut fs, &mut disk, "/a.txt", "/b.txt", 1, 1).unwrap();
        let content = cat(&fs, &mut disk, "/b.txt", 1, 1).unwrap();
        assert_eq!(content, b"new");
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn find_matches_glob() {
        let (mut disk, mut fs, path) = setup("find");
        mkdir(&mut fs, &mut disk, "/docs", 1, 1, false).unwrap();
        mkfile(&mut fs, &mut disk, "/docs/report.txt", 1, 1, FileContent::Bytes(b"x"), false).unwrap();
        mkfile(&mut fs, &mut disk, "/docs/image.png", 1, 1, FileContent::Bytes(b"x"), false).unwrap();
        let matches = find(&fs, &mut disk, "/", "*.txt").unwrap();
        assert_eq!(matches, vec!["/docs/report.txt".to_string()]);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn login_checks_plaintext_password() {
        let (mut disk, fs, path) = setup("login");
        let creds = login(&fs, &mut disk, "root", "123").unwrap();
        assert_eq!(creds.uid, 1);
        assert_eq!(creds.gid, 1);
        assert!(login(&fs, &mut disk, "root", "wrong").is_err());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn mkusr_requires_root() {
        let (mut disk, mut fs, path) = setup("mkusr-root");
        let err = mkusr(&mut fs, &mut disk, "root", "alice", "pw", false).unwrap_err();
        assert!(matches!(err, Error::Permission(_)));
        mkusr(&mut fs, &mut disk, "root", "alice", "pw", true).unwrap();
        let creds = login(&fs, &mut disk, "alice", "pw").unwrap();
        assert_eq!(creds.uid, 2);
        assert_eq!(creds.gid, 1);
        std::fs::remove_file(&path).ok();
    }
}
