//! Content-addressed append-only object store ("bucket pool"), grounded in
//! `original_source/lib/bucket.c` and `lib/bucket.h`.
//!
//! A [`Pool`] owns the file descriptor and replaces the source's
//! process-global `obuck_hdr`/`obuck_fd` pair with a handle struct, per the
//! "Global mutable state" design note. Locking uses `fcntl` byte-range
//! locks on bytes 0/1 of the file, exactly as the comment table in
//! `bucket.c` describes.

use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::os::unix::io::AsRawFd;
use std::path::Path;

use log::error;

use crate::error::PoolError;
use crate::oid::{self, Oid, OBUCK_ALIGN, OID_DELETED};

pub const MAGIC_LIVE: u32 = 0xdead_f00d;
/// The source spells this `OBUCK_INCOMPLETE_MAGIC 0xdeadfeeL`, which is not
/// a valid C hex literal (`L` is a suffix, not a digit); read as the
/// evident typo for `0xdeadfeed`.
pub const MAGIC_INCOMPLETE: u32 = 0xdead_feed;
pub const TRAILER: u32 = 0xfeed_cafe;

pub const BUCKET_TYPE_PLAIN: u32 = 0x8000_0000;
pub const BUCKET_TYPE_V30: u32 = 0x8000_0001;
pub const BUCKET_TYPE_V30C: u32 = 0x8000_0002;
pub const BUCKET_TYPE_V33: u32 = 0x8000_0003;
pub const BUCKET_TYPE_V33_LIZARD: u32 = 0x8000_0004;

const HEADER_LEN: u64 = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    pub magic: u32,
    pub oid: Oid,
    pub length: u32,
    pub type_: u32,
}

impl Header {
    fn to_bytes(self) -> [u8; 16] {
        let mut buf = [0u8; 16];
        buf[0..4].copy_from_slice(&self.magic.to_le_bytes());
        buf[4..8].copy_from_slice(&self.oid.to_le_bytes());
        buf[8..12].copy_from_slice(&self.length.to_le_bytes());
        buf[12..16].copy_from_slice(&self.type_.to_le_bytes());
        buf
    }

    fn from_bytes(buf: &[u8; 16]) -> Header {
        Header {
            magic: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            oid: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            length: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
            type_: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
        }
    }
}

/// Header plus the file offset it was read from.
#[derive(Clone, Copy, Debug)]
pub struct Located {
    pub header: Header,
    pub pos: u64,
}

fn pread_exact(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
    while !buf.is_empty() {
        let n = unsafe {
            libc::pread(file.as_raw_fd(), buf.as_mut_ptr() as *mut libc::c_void, buf.len(), offset as i64)
        };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "short read"));
        }
        buf = &mut buf[n as usize..];
        offset += n as u64;
    }
    Ok(())
}

fn pread_some(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    let n = unsafe { libc::pread(file.as_raw_fd(), buf.as_mut_ptr() as *mut libc::c_void, buf.len(), offset as i64) };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(n as usize)
}

fn pwrite_exact(file: &File, mut buf: &[u8], mut offset: u64) -> io::Result<()> {
    while !buf.is_empty() {
        let n = unsafe {
            libc::pwrite(file.as_raw_fd(), buf.as_ptr() as *const libc::c_void, buf.len(), offset as i64)
        };
        if n <= 0 {
            return Err(io::Error::last_os_error());
        }
        buf = &buf[n as usize..];
        offset += n as u64;
    }
    Ok(())
}

fn do_lock(file: &File, lock_type: libc::c_short, start: i16, len: i16) -> io::Result<()> {
    let mut fl: libc::flock = unsafe { std::mem::zeroed() };
    fl.l_type = lock_type;
    fl.l_whence = libc::SEEK_SET as libc::c_short;
    fl.l_start = start as libc::off_t;
    fl.l_len = len as libc::off_t;
    let ret = unsafe { libc::fcntl(file.as_raw_fd(), libc::F_SETLKW, &fl) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Handle owning the bucket pool's file descriptor. Replaces the source's
/// global `obuck_fd`/`obuck_hdr` pair.
pub struct Pool {
    file: File,
    writer_open: bool,
}

impl Pool {
    pub fn open(path: impl AsRef<Path>, writeable: bool) -> Result<Pool, PoolError> {
        let file = OpenOptions::new()
            .read(true)
            .write(writeable)
            .create(writeable)
            .open(path)?;
        let pool = Pool { file, writer_open: false };
        pool.lock_read()?;
        let size = pool.file.metadata()?.len();
        if size > 0 {
            let mut check = [0u8; 4];
            pread_exact(&pool.file, &mut check, size - 4)?;
            if u32::from_le_bytes(check) != TRAILER {
                pool.unlock()?;
                return Err(PoolError::Corrupt { msg: "missing trailer of last object", pos: size - 4 });
            }
        }
        pool.unlock()?;
        Ok(pool)
    }

    fn lock_read(&self) -> io::Result<()> {
        do_lock(&self.file, libc::F_RDLCK as libc::c_short, 0, 2)
    }

    fn lock_write(&self) -> io::Result<()> {
        do_lock(&self.file, libc::F_WRLCK as libc::c_short, 0, 2)
    }

    fn lock_append(&self) -> io::Result<()> {
        do_lock(&self.file, libc::F_WRLCK as libc::c_short, 0, 1)
    }

    fn lock_read_to_scan(&self) -> io::Result<()> {
        do_lock(&self.file, libc::F_UNLCK as libc::c_short, 0, 1)
    }

    fn unlock(&self) -> io::Result<()> {
        do_lock(&self.file, libc::F_UNLCK as libc::c_short, 0, 2)
    }

    fn file_size(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn read_header(&self, pos: u64) -> Result<Header, PoolError> {
        let mut buf = [0u8; 16];
        pread_exact(&self.file, &mut buf, pos)?;
        Ok(Header::from_bytes(&buf))
    }

    fn check_header(&self, hdr: &Header, pos: u64, expect_oid: Oid) -> Result<(), PoolError> {
        if hdr.magic != MAGIC_LIVE {
            return Err(PoolError::Corrupt { msg: "missing magic number", pos });
        }
        if hdr.oid == OID_DELETED {
            return Err(PoolError::Corrupt { msg: "access to deleted bucket", pos });
        }
        if hdr.oid != expect_oid {
            return Err(PoolError::Corrupt { msg: "invalid backlink", pos });
        }
        Ok(())
    }

    pub fn find_by_oid(&self, oid: Oid) -> Result<Located, PoolError> {
        assert!(oid < oid::OID_FIRST_SPECIAL);
        let pos = oid::oid_to_offset(oid);
        self.lock_read()?;
        let hdr = self.read_header(pos);
        self.unlock()?;
        let hdr = hdr?;
        self.check_header(&hdr, pos, oid)?;
        Ok(Located { header: hdr, pos })
    }

    pub fn find_first(&self, cursor: &mut ScanCursor, full: bool) -> Result<Option<Located>, PoolError> {
        cursor.pos = 0;
        cursor.prev_len = None;
        self.find_next(cursor, full)
    }

    pub fn find_next(&self, cursor: &mut ScanCursor, full: bool) -> Result<Option<Located>, PoolError> {
        loop {
            if let Some(len) = cursor.prev_len {
                cursor.pos += oid::aligned_bucket_size(len);
            }
            self.lock_read()?;
            let mut buf = [0u8; 16];
            let n = pread_some(&self.file, &mut buf, cursor.pos)?;
            self.unlock()?;
            if n == 0 {
                return Ok(None);
            }
            if n != 16 {
                return Err(PoolError::Corrupt { msg: "short header read", pos: cursor.pos });
            }
            let hdr = Header::from_bytes(&buf);
            if hdr.magic != MAGIC_LIVE {
                return Err(PoolError::Corrupt { msg: "missing magic number", pos: cursor.pos });
            }
            cursor.prev_len = Some(hdr.length);
            if hdr.oid != OID_DELETED || full {
                return Ok(Some(Located { header: hdr, pos: cursor.pos }));
            }
        }
    }

    pub fn fetch(&self, loc: &Located) -> BucketReader {
        let aligned = oid::aligned_bucket_size(loc.header.length);
        BucketReader {
            file: self.file.try_clone().expect("dup bucket fd"),
            data_start: loc.pos + HEADER_LEN,
            length: loc.header.length,
            read_pos: 0,
            trailer_pos: loc.pos + aligned - 4,
        }
    }

    pub fn predict_last_oid(&self) -> Result<Oid, PoolError> {
        Ok(oid::offset_to_oid(self.file_size()?))
    }

    pub fn create(&mut self, type_: u32) -> Result<BucketWriter<'_>, PoolError> {
        if self.writer_open {
            return Err(PoolError::WriterBusy);
        }
        self.lock_append()?;
        let start = self.file_size()?;
        if start & (OBUCK_ALIGN - 1) != 0 {
            self.unlock()?;
            return Err(PoolError::Corrupt { msg: "misaligned file", pos: start });
        }
        let incomplete = Header { magic: MAGIC_INCOMPLETE, oid: oid::offset_to_oid(start), length: 0, type_ };
        if let Err(e) = pwrite_exact(&self.file, &incomplete.to_bytes(), start) {
            self.unlock()?;
            return Err(e.into());
        }
        self.writer_open = true;
        Ok(BucketWriter { pool: self, start_pos: start, buf: Vec::new(), type_ })
    }

    pub fn delete(&mut self, oid: Oid) -> Result<(), PoolError> {
        self.lock_write()?;
        let pos = oid::oid_to_offset(oid);
        let result = (|| -> Result<(), PoolError> {
            let mut hdr = self.read_header(pos)?;
            self.check_header(&hdr, pos, oid)?;
            hdr.oid = OID_DELETED;
            pwrite_exact(&self.file, &hdr.to_bytes(), pos)?;
            Ok(())
        })();
        self.unlock()?;
        result
    }

    pub fn slurp(&mut self) -> Result<SlurpIter<'_>, PoolError> {
        self.lock_read()?;
        let end = self.file_size()?;
        self.lock_read_to_scan()?;
        Ok(SlurpIter { pool: self, pos: 0, end, locked: true })
    }

    /// In-place compaction, grounded in `obuck_shakedown`. `kibitz` is
    /// consulted for every live bucket and decides whether it survives.
    pub fn shakedown(
        &mut self,
        buf_size: usize,
        security: u32,
        mut kibitz: impl FnMut(&Header, Oid, &[u8]) -> KibitzAction,
    ) -> Result<(), PoolError> {
        let buflen = ((buf_size as u64 + OBUCK_ALIGN - 1) & !(OBUCK_ALIGN - 1)) as usize;
        let mut buf = vec![0u8; buflen];

        self.lock_write()?;
        let r_file_size = self.file_size()?;
        if r_file_size & (OBUCK_ALIGN - 1) != 0 {
            self.unlock()?;
            return Err(PoolError::Corrupt { msg: "pool length not aligned", pos: r_file_size });
        }

        let mut rstart: u64 = 0;
        let mut wstart: u64 = 0;
        let mut roff: usize = 0;
        let mut woff: usize = 0;
        let mut rsize: usize = 0;
        let mut changed = false;
        let mut wrote_anything = false;

        macro_rules! bail {
            ($msg:literal, $pos:expr) => {{
                error!("object pool shakedown: {} (pos={:#x})", $msg, $pos);
                self.shake_erase(wstart, rstart)?;
                self.unlock()?;
                return Err(PoolError::Corrupt { msg: $msg, pos: $pos });
            }};
        }

        loop {
            let r_bucket_start = rstart + roff as u64;
            let w_bucket_start = wstart + woff as u64;
            let mut more: usize = 0;

            if roff != rsize {
                let hdr = Header::from_bytes(&buf[roff..roff + 16].try_into().unwrap());
                let expect_oid = oid::offset_to_oid(r_bucket_start);
                if hdr.magic != MAGIC_LIVE || (hdr.oid != OID_DELETED && hdr.oid != expect_oid) {
                    bail!("header mismatch", r_bucket_start);
                }
                let l = oid::aligned_bucket_size(hdr.length) as usize;
                if l > buflen {
                    if hdr.oid != OID_DELETED {
                        bail!("bucket longer than shake buffer", r_bucket_start);
                    }
                    rsize = roff + l;
                } else if rsize - roff < l {
                    more = l - (rsize - roff);
                } else {
                    let trailer_at = roff + l - 4;
                    if u32::from_le_bytes(buf[trailer_at..trailer_at + 4].try_into().unwrap()) != TRAILER {
                        bail!("missing trailer", r_bucket_start);
                    }
                    if hdr.oid != OID_DELETED {
                        let action = kibitz(&hdr, oid::offset_to_oid(w_bucket_start), &buf[roff + 16..roff + l - 4]);
                        match action {
                            KibitzAction::Drop => changed = true,
                            KibitzAction::Keep | KibitzAction::KeepModified(_) => {
                                let mut lnew = l;
                                if let KibitzAction::KeepModified(new_len) = action {
                                    lnew = oid::aligned_bucket_size(new_len) as usize;
                                    let tpos = lnew - 4;
                                    buf[roff + tpos..roff + tpos + 4].copy_from_slice(&TRAILER.to_le_bytes());
                                    changed = true;
                                }
                                if roff != woff {
                                    buf.copy_within(roff..roff + lnew, woff);
                                }
                                let new_oid = oid::offset_to_oid(w_bucket_start);
                                buf[woff + 4..woff + 8].copy_from_slice(&new_oid.to_le_bytes());
                                woff += lnew;
                            }
                        }
                    } else {
                        kibitz(&hdr, OID_DELETED, &[]);
                        changed = true;
                    }
                    roff += l;
                    continue;
                }
            }

            // "next:" — flush what's pending and refill.
            if changed {
                if !wrote_anything {
                    if security > 0 {
                        self.shake_write_backup(r_file_size, &buf[..woff], &buf[roff..rsize], r_bucket_start, more)?;
                        self.shake_sync(security)?;
                    }
                    wrote_anything = true;
                }
                if woff > 0 {
                    pwrite_exact(&self.file, &buf[..woff], wstart)?;
                    self.shake_sync(security)?;
                }
            } else {
                debug_assert_eq!(wstart, rstart);
            }

            wstart += woff as u64;
            woff = 0;
            rstart += roff as u64;
            if more > 0 {
                buf.copy_within(roff..rsize, 0);
                rsize -= roff;
            } else {
                rsize = 0;
            }

            let r_bucket_start = rstart + rsize as u64;
            let want = (buflen - rsize).min((r_file_size - r_bucket_start) as usize);
            let n = pread_some(&self.file, &mut buf[rsize..rsize + want], r_bucket_start)?;
            if n == 0 {
                if more == 0 {
                    break;
                }
                bail!("unexpected eof", r_bucket_start);
            }
            if n & (OBUCK_ALIGN as usize - 1) != 0 {
                bail!("garbage at end of file", r_bucket_start);
            }
            rsize += n;
            roff = 0;
        }

        self.file.set_len(wstart)?;
        self.shake_sync(security)?;
        self.unlock()?;
        Ok(())
    }

    fn shake_sync(&self, security: u32) -> io::Result<()> {
        if security > 1 {
            self.file.sync_data()?;
        }
        Ok(())
    }

    fn shake_write_backup(
        &self,
        mut bpos: u64,
        norm_buf: &[u8],
        fragment: &[u8],
        frag_pos: u64,
        more_size: usize,
    ) -> Result<(), PoolError> {
        let mut boff = 0usize;
        while boff < norm_buf.len() {
            let hdr = Header::from_bytes(&norm_buf[boff..boff + 16].try_into().unwrap());
            let l = oid::aligned_bucket_size(hdr.length) as usize;
            let mut rewritten = norm_buf[boff..boff + l].to_vec();
            rewritten[4..8].copy_from_slice(&oid::offset_to_oid(bpos).to_le_bytes());
            pwrite_exact(&self.file, &rewritten, bpos)?;
            boff += l;
            bpos += l as u64;
        }
        if more_size > 0 && !fragment.is_empty() {
            let hdr = Header::from_bytes(&fragment[0..16].try_into().unwrap());
            let mut rewritten = fragment.to_vec();
            rewritten[4..8].copy_from_slice(&oid::offset_to_oid(bpos).to_le_bytes());
            let _ = hdr;
            pwrite_exact(&self.file, &rewritten, bpos)?;
            let frag_size = fragment.len();
            bpos += frag_size as u64;
            let mut remaining = more_size;
            let mut src = frag_pos + frag_size as u64;
            let mut aux = vec![0u8; 65536];
            while remaining > 0 {
                let j = remaining.min(aux.len());
                pread_exact(&self.file, &mut aux[..j], src)?;
                pwrite_exact(&self.file, &aux[..j], bpos)?;
                bpos += j as u64;
                src += j as u64;
                remaining -= j;
            }
        }
        Ok(())
    }

    fn shake_erase(&self, mut start: u64, end: u64) -> Result<(), PoolError> {
        if start > end {
            return Ok(());
        }
        while start < end {
            let len = (end - start).min(0x4000_0000);
            let hdr = Header { magic: MAGIC_LIVE, oid: OID_DELETED, length: (len - 16 - 4) as u32, type_: 0 };
            pwrite_exact(&self.file, &hdr.to_bytes(), start)?;
            pwrite_exact(&self.file, &TRAILER.to_le_bytes(), start + len - 4)?;
            start += len;
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KibitzAction {
    Keep,
    KeepModified(u32),
    Drop,
}

/// Explicit iteration state for `find_first`/`find_next`, replacing the
/// source's global `obuck_hdr`/`bucket_find_pos` pair (see "Coroutine-style
/// iterators" design note).
#[derive(Default)]
pub struct ScanCursor {
    pos: u64,
    prev_len: Option<u32>,
}

impl ScanCursor {
    pub fn new() -> Self {
        ScanCursor::default()
    }
}

pub struct BucketReader {
    file: File,
    data_start: u64,
    length: u32,
    read_pos: u32,
    trailer_pos: u64,
}

impl Read for BucketReader {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        let remaining = self.length - self.read_pos;
        if remaining == 0 {
            return Ok(0);
        }
        let want = out.len().min(remaining as usize);
        if want == 0 {
            return Ok(0);
        }
        pread_exact(&self.file, &mut out[..want], self.data_start + self.read_pos as u64)?;
        self.read_pos += want as u32;
        if self.read_pos == self.length {
            let mut tb = [0u8; 4];
            pread_exact(&self.file, &mut tb, self.trailer_pos)?;
            if u32::from_le_bytes(tb) != TRAILER {
                return Err(io::Error::new(io::ErrorKind::InvalidData, "missing trailer"));
            }
        }
        Ok(want)
    }
}

pub struct BucketWriter<'p> {
    pool: &'p mut Pool,
    start_pos: u64,
    buf: Vec<u8>,
    type_: u32,
}

impl<'p> io::Write for BucketWriter<'p> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'p> BucketWriter<'p> {
    /// Commits the accumulated payload, grounded in `obuck_create_end`:
    /// pad to alignment, append trailer, then overwrite the incomplete
    /// header with the final one.
    pub fn finish(self) -> Result<Header, PoolError> {
        let BucketWriter { pool, start_pos, mut buf, type_ } = self;
        let length = buf.len() as u32;
        let aligned = oid::aligned_bucket_size(length) as usize;
        buf.resize(aligned - HEADER_LEN as usize - 4, 0);
        buf.extend_from_slice(&TRAILER.to_le_bytes());
        pwrite_exact(&pool.file, &buf, start_pos + HEADER_LEN)?;

        let header = Header { magic: MAGIC_LIVE, oid: oid::offset_to_oid(start_pos), length, type_ };
        pwrite_exact(&pool.file, &header.to_bytes(), start_pos)?;
        pool.unlock()?;
        pool.writer_open = false;
        Ok(header)
    }
}

/// Full-pool streaming scan that downgrades Read to Scan after snapshotting
/// the file size, so an appender can make progress concurrently (grounded
/// in `obuck_slurp_pool`).
pub struct SlurpIter<'p> {
    pool: &'p Pool,
    pos: u64,
    end: u64,
    locked: bool,
}

impl<'p> SlurpIter<'p> {
    pub fn next_bucket(&mut self) -> Result<Option<(Header, BucketReader)>, PoolError> {
        loop {
            if self.pos >= self.end {
                return Ok(None);
            }
            let hdr = self.pool.read_header(self.pos)?;
            if hdr.magic != MAGIC_LIVE {
                return Err(PoolError::Corrupt { msg: "missing magic number", pos: self.pos });
            }
            let expect = oid::offset_to_oid(self.pos);
            if hdr.oid != OID_DELETED && hdr.oid != expect {
                return Err(PoolError::Corrupt { msg: "invalid backlink", pos: self.pos });
            }
            let loc = Located { header: hdr, pos: self.pos };
            self.pos += oid::aligned_bucket_size(hdr.length);
            if hdr.oid == OID_DELETED {
                continue;
            }
            let reader = self.pool.fetch(&loc);
            return Ok(Some((hdr, reader)));
        }
    }
}

impl<'p> Drop for SlurpIter<'p> {
    fn drop(&mut self) {
        if self.locked {
            let _ = self.pool.unlock();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use std::sync::atomic::{AtomicU32, Ordering};

    static COUNTER: AtomicU32 = AtomicU32::new(0);

    struct TestTempDir {
        path: std::path::PathBuf,
    }

    impl TestTempDir {
        fn new() -> Self {
            let n = COUNTER.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!("picidx-bucket-test-{}-{}", std::process::id(), n));
            std::fs::create_dir_all(&path).unwrap();
            TestTempDir { path }
        }

        fn file(&self, name: &str) -> std::path::PathBuf {
            self.path.join(name)
        }
    }

    impl Drop for TestTempDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.path);
        }
    }

    fn make_payload(len: usize, seed: u8) -> Vec<u8> {
        (0..len).map(|i| (i as u8).wrapping_add(seed)).collect()
    }

    #[test]
    fn s1_bucket_round_trip() {
        let dir = TestTempDir::new();
        let path = dir.file("pool.bin");
        let mut pool = Pool::open(&path, true).unwrap();

        let lens = [0usize, 5, 127, 128, 1023];
        let mut oids = Vec::new();
        for &len in &lens {
            let payload = make_payload(len, 0);
            let mut w = pool.create(BUCKET_TYPE_PLAIN).unwrap();
            w.write_all(&payload).unwrap();
            let hdr = w.finish().unwrap();
            oids.push(hdr.oid);
        }

        for (i, &oid) in oids.iter().enumerate() {
            let loc = pool.find_by_oid(oid).unwrap();
            assert_eq!(loc.header.length as usize, lens[i]);
            let mut reader = pool.fetch(&loc);
            let mut out = Vec::new();
            reader.read_to_end(&mut out).unwrap();
            assert_eq!(out, make_payload(lens[i], 0));
        }

        let mut cursor = ScanCursor::new();
        let mut found = Vec::new();
        let mut next = pool.find_first(&mut cursor, false).unwrap();
        while let Some(loc) = next {
            found.push(loc.header.oid);
            next = pool.find_next(&mut cursor, false).unwrap();
        }
        assert_eq!(found, oids);
    }

    #[test]
    fn s2_delete_and_shakedown() {
        let dir = TestTempDir::new();
        let path = dir.file("pool.bin");
        let mut pool = Pool::open(&path, true).unwrap();

        let lens = [0usize, 5, 127, 128, 1023];
        let mut oids = Vec::new();
        for &len in &lens {
            let payload = make_payload(len, 1);
            let mut w = pool.create(BUCKET_TYPE_PLAIN).unwrap();
            w.write_all(&payload).unwrap();
            oids.push(w.finish().unwrap().oid);
        }

        for &idx in &[0usize, 2, 4] {
            pool.delete(oids[idx]).unwrap();
        }

        pool.shakedown(1 << 20, 0, |_old, _new, _payload| KibitzAction::Keep).unwrap();

        let mut cursor = ScanCursor::new();
        let mut remaining = Vec::new();
        let mut next = pool.find_first(&mut cursor, false).unwrap();
        while let Some(loc) = next {
            remaining.push(loc);
            next = pool.find_next(&mut cursor, false).unwrap();
        }
        assert_eq!(remaining.len(), 2);
        assert_eq!(remaining[0].header.oid, 0);
        assert_eq!(remaining[0].header.length as usize, lens[1]);
        assert_eq!(remaining[1].header.oid, oid::offset_to_oid(oid::aligned_bucket_size(lens[1] as u32)));
        assert_eq!(remaining[1].header.length as usize, lens[3]);

        let file_size = std::fs::metadata(&path).unwrap().len();
        let expected = oid::aligned_bucket_size(lens[1] as u32) + oid::aligned_bucket_size(lens[3] as u32);
        assert_eq!(file_size, expected);
    }

    #[test]
    fn empty_pool_has_no_buckets() {
        let dir = TestTempDir::new();
        let pool = Pool::open(dir.file("empty.bin"), true).unwrap();
        let mut cursor = ScanCursor::new();
        assert!(pool.find_first(&mut cursor, false).unwrap().is_none());
    }

    #[test]
    fn slurp_yields_all_live_buckets() {
        let dir = TestTempDir::new();
        let mut pool = Pool::open(dir.file("pool.bin"), true).unwrap();
        let mut oids = Vec::new();
        for len in [3usize, 40, 200] {
            let mut w = pool.create(BUCKET_TYPE_PLAIN).unwrap();
            w.write_all(&make_payload(len, 7)).unwrap();
            oids.push(w.finish().unwrap().oid);
        }
        let mut slurp = pool.slurp().unwrap();
        let mut seen = Vec::new();
        while let Some((hdr, mut reader)) = slurp.next_bucket().unwrap() {
            let mut buf = Vec::new();
            reader.read_to_end(&mut buf).unwrap();
            seen.push(hdr.oid);
        }
        assert_eq!(seen, oids);
    }
}
