//! Slotted-page heap tuple file.
//!
//! Page 0 is a header page: it self-describes with the embedded table
//! schema, column statistics, and the head of the free-page list, so a
//! heap file can be opened from nothing but its path. Pages `1..num_pages`
//! are data pages laid out as a slot array growing from page start and a
//! tuple-data region packed contiguously backward from a 6-byte footer
//! (`free_next: u32`, a packed `on_free_list` flag and `num_slots: u16`).
//! Tuple relocation across pages is a non-goal: an update that cannot fit
//! back into its own page's free space fails with `PageFullOnUpdate`
//! rather than moving the tuple.

use std::path::{Path, PathBuf};

use catalog::TableSchema;
use common::{DbError, DbResult, PageId, RecordId};
use hashbrown::HashSet;
use serde::{Deserialize, Serialize};
use types::Value;

use crate::cursor::PagePinner;
use crate::file::{DbFile, FileType};
use crate::page::Page;
use crate::tuple::{decode_tuple, encode_tuple};

const FOOTER_LEN: usize = 6;
const SLOT_LEN: usize = 4;
const NONE_PAGE: u32 = u32::MAX;
const ON_FREE_LIST_BIT: u16 = 0x8000;
const NUM_SLOTS_MASK: u16 = 0x7FFF;

/// Per-column statistics, approximate between `HeapFile::analyze` runs.
/// Inserts and updates keep `null_count`/`true_count`/min/max current
/// exactly; deletes only adjust counts, leaving min/max stale until the
/// next `analyze`. `distinct_count` is analyze-only: maintaining it
/// incrementally would require keeping every column's full value set
/// resident between runs, so it is left at its last-computed value (0
/// before the first `analyze`) by every incremental mutation.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ColumnStats {
    pub null_count: u64,
    pub true_count: u64,
    pub distinct_count: u64,
    pub min_int: Option<i64>,
    pub max_int: Option<i64>,
    pub min_text_len: Option<u32>,
    pub max_text_len: Option<u32>,
}

/// Table-level statistics embedded in the heap file's header page.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TableStats {
    pub row_count: u64,
    /// Number of data pages in use (excludes the header page). Analyze-only,
    /// like `distinct_count`: incremental inserts/deletes don't recompute it.
    pub num_pages: u64,
    /// Sum of every live tuple's encoded byte size. Analyze-only.
    pub total_tuple_bytes: u64,
    pub columns: Vec<ColumnStats>,
}

impl TableStats {
    pub fn new(num_columns: usize) -> Self {
        Self {
            row_count: 0,
            num_pages: 0,
            total_tuple_bytes: 0,
            columns: vec![ColumnStats::default(); num_columns],
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct HeapHeaderBlob {
    free_list_head: u32,
    num_pages: u64,
    schema: TableSchema,
    stats: TableStats,
}

fn encode_blob(blob: &HeapHeaderBlob) -> DbResult<Vec<u8>> {
    bincode::serde::encode_to_vec(blob, bincode::config::standard())
        .map_err(|e| DbError::DataFormat(format!("encode heap header: {e}")))
}

fn decode_blob(bytes: &[u8]) -> DbResult<HeapHeaderBlob> {
    let (blob, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| DbError::DataFormat(format!("decode heap header: {e}")))?;
    Ok(blob)
}

fn read_header_blob(page: &Page) -> DbResult<HeapHeaderBlob> {
    let len = page.read_u32(2)? as usize;
    if 6 + len > page.page_size() {
        return Err(DbError::DataFormat(
            "heap header blob length exceeds page size".into(),
        ));
    }
    decode_blob(&page.data[6..6 + len])
}

fn write_header_blob(page: &mut Page, blob: &HeapHeaderBlob) -> DbResult<()> {
    let bytes = encode_blob(blob)?;
    if 6 + bytes.len() > page.page_size() {
        return Err(DbError::IllegalState(
            "heap header (schema + stats) does not fit in one page".into(),
        ));
    }
    page.write_u32(2, bytes.len() as u32)?;
    page.data[6..6 + bytes.len()].copy_from_slice(&bytes);
    Ok(())
}

fn footer_start(page_size: usize) -> usize {
    page_size - FOOTER_LEN
}

/// `(free_next, num_slots, on_free_list)`.
fn read_footer(page: &Page) -> DbResult<(u32, u16, bool)> {
    let fs = footer_start(page.page_size());
    let free_next = page.read_u32(fs)?;
    let packed = page.read_u16(fs + 4)?;
    Ok((
        free_next,
        packed & NUM_SLOTS_MASK,
        packed & ON_FREE_LIST_BIT != 0,
    ))
}

fn write_footer(page: &mut Page, free_next: u32, num_slots: u16, on_free_list: bool) -> DbResult<()> {
    let fs = footer_start(page.page_size());
    page.write_u32(fs, free_next)?;
    let packed = (num_slots & NUM_SLOTS_MASK) | if on_free_list { ON_FREE_LIST_BIT } else { 0 };
    page.write_u16(fs + 4, packed)
}

fn slot_base(slot: u16) -> usize {
    slot as usize * SLOT_LEN
}

fn read_slot(page: &Page, slot: u16) -> DbResult<(u16, u16)> {
    let base = slot_base(slot);
    Ok((page.read_u16(base)?, page.read_u16(base + 2)?))
}

fn write_slot(page: &mut Page, slot: u16, offset: u16, length: u16) -> DbResult<()> {
    let base = slot_base(slot);
    page.write_u16(base, offset)?;
    page.write_u16(base + 2, length)
}

/// The lowest offset any live tuple starts at; the boundary between free
/// space and the packed tuple-data region.
fn free_space_low(page: &Page, num_slots: u16) -> DbResult<usize> {
    let mut low = footer_start(page.page_size());
    for slot in 0..num_slots {
        let (offset, length) = read_slot(page, slot)?;
        if length > 0 && (offset as usize) < low {
            low = offset as usize;
        }
    }
    Ok(low)
}

/// Free bytes remaining assuming one more slot-array entry might be
/// needed — the conservative bound used to decide free-list membership.
fn worst_case_avail(page: &Page, num_slots: u16) -> DbResult<isize> {
    let low = free_space_low(page, num_slots)? as isize;
    let slot_array_end = (num_slots as isize + 1) * SLOT_LEN as isize;
    Ok(low - slot_array_end)
}

fn find_empty_slot(page: &Page, num_slots: u16) -> DbResult<Option<u16>> {
    for slot in 0..num_slots {
        if read_slot(page, slot)?.1 == 0 {
            return Ok(Some(slot));
        }
    }
    Ok(None)
}

fn read_tuple_bytes(page: &Page, slot: u16) -> DbResult<Vec<u8>> {
    let (offset, length) = read_slot(page, slot)?;
    if length == 0 {
        return Err(DbError::InvalidFilePointer(format!(
            "slot {slot} on page {} is empty",
            page.page_no
        )));
    }
    Ok(page.data[offset as usize..offset as usize + length as usize].to_vec())
}

/// Try to place `bytes` on `page`, reusing a tombstoned slot if one
/// exists. Returns `Ok(None)` (not an error) if the page has no room.
fn try_insert_into_page(page: &mut Page, bytes: &[u8]) -> DbResult<Option<u16>> {
    let (_, num_slots, _) = read_footer(page)?;
    let reuse = find_empty_slot(page, num_slots)?;
    let low = free_space_low(page, num_slots)?;
    let slot_array_end = match reuse {
        Some(_) => num_slots as usize * SLOT_LEN,
        None => (num_slots as usize + 1) * SLOT_LEN,
    };
    if low < slot_array_end || low - slot_array_end < bytes.len() {
        return Ok(None);
    }

    let new_offset = low - bytes.len();
    page.data[new_offset..new_offset + bytes.len()].copy_from_slice(bytes);
    let slot_idx = reuse.unwrap_or(num_slots);
    write_slot(page, slot_idx, new_offset as u16, bytes.len() as u16)?;
    if reuse.is_none() {
        let (free_next, _, on_free_list) = read_footer(page)?;
        write_footer(page, free_next, num_slots + 1, on_free_list)?;
    }
    page.mark_dirty();
    Ok(Some(slot_idx))
}

/// Remove a tuple and compact the tuple-data region so live tuples stay
/// contiguous: the single block of tuples packed below the deleted one is
/// memmove'd up by the freed length, then their slot offsets are adjusted.
fn delete_from_page(page: &mut Page, slot: u16) -> DbResult<()> {
    let (_, num_slots, _) = read_footer(page)?;
    if slot >= num_slots {
        return Err(DbError::InvalidFilePointer(format!(
            "slot {slot} out of range (page has {num_slots} slots)"
        )));
    }
    let (offset, length) = read_slot(page, slot)?;
    if length == 0 {
        return Err(DbError::InvalidFilePointer(format!(
            "slot {slot} is already empty"
        )));
    }

    let low = free_space_low(page, num_slots)?;
    let block_len = offset as usize - low;
    if block_len > 0 {
        page.data
            .copy_within(low..low + block_len, low + length as usize);
    }
    for other in 0..num_slots {
        if other == slot {
            continue;
        }
        let (o2, l2) = read_slot(page, other)?;
        if l2 > 0 && (o2 as usize) < offset as usize {
            write_slot(page, other, o2 + length, l2)?;
        }
    }
    write_slot(page, slot, 0, 0)?;
    page.mark_dirty();
    Ok(())
}

/// Replace the bytes at `slot` in place. Returns `Ok(false)` (not an
/// error) if the new value does not fit even after reclaiming the old
/// one's space.
fn update_in_page(page: &mut Page, slot: u16, new_bytes: &[u8]) -> DbResult<bool> {
    let (_, num_slots, _) = read_footer(page)?;
    let (_, length) = read_slot(page, slot)?;
    if length == 0 {
        return Err(DbError::InvalidFilePointer(format!(
            "slot {slot} is empty, nothing to update"
        )));
    }
    let low = free_space_low(page, num_slots)?;
    let avail_after_free = (low + length as usize) as isize - (num_slots as usize * SLOT_LEN) as isize;
    if new_bytes.len() as isize > avail_after_free {
        return Ok(false);
    }

    delete_from_page(page, slot)?;
    let low2 = free_space_low(page, num_slots)?;
    let new_offset = low2 - new_bytes.len();
    page.data[new_offset..new_offset + new_bytes.len()].copy_from_slice(new_bytes);
    write_slot(page, slot, new_offset as u16, new_bytes.len() as u16)?;
    page.mark_dirty();
    Ok(true)
}

fn bump_stats(stats: &mut TableStats, values: &[Value]) {
    stats.row_count += 1;
    for (column_stats, value) in stats.columns.iter_mut().zip(values) {
        match value {
            Value::Null => column_stats.null_count += 1,
            Value::Int(v) => {
                column_stats.min_int = Some(column_stats.min_int.map_or(*v, |m| m.min(*v)));
                column_stats.max_int = Some(column_stats.max_int.map_or(*v, |m| m.max(*v)));
            }
            Value::Text(s) => {
                let len = s.len() as u32;
                column_stats.min_text_len =
                    Some(column_stats.min_text_len.map_or(len, |m| m.min(len)));
                column_stats.max_text_len =
                    Some(column_stats.max_text_len.map_or(len, |m| m.max(len)));
            }
            Value::Bool(b) => {
                if *b {
                    column_stats.true_count += 1;
                }
            }
        }
    }
}

fn unbump_stats(stats: &mut TableStats, values: &[Value]) {
    stats.row_count = stats.row_count.saturating_sub(1);
    for (column_stats, value) in stats.columns.iter_mut().zip(values) {
        match value {
            Value::Null => column_stats.null_count = column_stats.null_count.saturating_sub(1),
            Value::Bool(true) => {
                column_stats.true_count = column_stats.true_count.saturating_sub(1)
            }
            _ => {}
        }
    }
}

/// A slotted-page heap file holding the tuples of one table.
pub struct HeapFile {
    path: PathBuf,
    page_size: usize,
}

impl HeapFile {
    /// Create a new, empty heap file for `schema`.
    pub fn create(path: impl AsRef<Path>, schema: TableSchema, page_size: usize) -> DbResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = DbFile::create(&path, FileType::HeapData, page_size)?;
        let mut header_page = file.load_page(0, false)?;
        let blob = HeapHeaderBlob {
            free_list_head: NONE_PAGE,
            num_pages: 1,
            stats: TableStats::new(schema.len()),
            schema,
        };
        write_header_blob(&mut header_page, &blob)?;
        file.save_page(&header_page)?;
        file.sync()?;
        Ok(Self { path, page_size })
    }

    /// Open an existing heap file.
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = DbFile::open(&path)?
            .ok_or_else(|| DbError::NotFound(path.display().to_string()))?;
        if file.file_type() != FileType::HeapData {
            return Err(DbError::TypeMismatch(format!(
                "{} is a {:?} file, expected HeapData",
                path.display(),
                file.file_type()
            )));
        }
        Ok(Self {
            path,
            page_size: file.page_size(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    fn read_header(&self, pinner: &mut dyn PagePinner) -> DbResult<HeapHeaderBlob> {
        pinner.pin(&self.path, 0, false)?;
        let page = pinner.page_mut(&self.path, 0)?;
        let blob = read_header_blob(page)?;
        pinner.unpin(&self.path, 0, false)?;
        Ok(blob)
    }

    fn write_header(&self, pinner: &mut dyn PagePinner, blob: &HeapHeaderBlob) -> DbResult<()> {
        pinner.pin(&self.path, 0, false)?;
        {
            let page = pinner.page_mut(&self.path, 0)?;
            write_header_blob(page, blob)?;
            page.mark_dirty();
        }
        pinner.unpin(&self.path, 0, true)?;
        Ok(())
    }

    pub fn schema(&self, pinner: &mut dyn PagePinner) -> DbResult<TableSchema> {
        Ok(self.read_header(pinner)?.schema)
    }

    pub fn stats(&self, pinner: &mut dyn PagePinner) -> DbResult<TableStats> {
        Ok(self.read_header(pinner)?.stats)
    }

    /// Insert a new tuple, using the free-page list before extending the
    /// file.
    pub fn insert_tuple(
        &self,
        pinner: &mut dyn PagePinner,
        values: &[Value],
    ) -> DbResult<RecordId> {
        let mut header = self.read_header(pinner)?;
        let bytes = encode_tuple(&header.schema, values)?;
        if bytes.len() > self.page_size.saturating_sub(FOOTER_LEN + SLOT_LEN) {
            return Err(DbError::TupleTooLarge(format!(
                "tuple of {} bytes cannot fit on a {}-byte page",
                bytes.len(),
                self.page_size
            )));
        }

        let mut candidate = header.free_list_head;
        while candidate != NONE_PAGE {
            let page_no = candidate as u64;
            pinner.pin(&self.path, page_no, false)?;
            let page = pinner.page_mut(&self.path, page_no)?;
            let inserted = try_insert_into_page(page, &bytes)?;
            let (next, num_slots, _) = read_footer(page)?;

            if let Some(slot_idx) = inserted {
                if worst_case_avail(page, num_slots)? <= 0 {
                    write_footer(page, next, num_slots, false)?;
                    header.free_list_head = next;
                }
                pinner.unpin(&self.path, page_no, true)?;
                bump_stats(&mut header.stats, values);
                self.write_header(pinner, &header)?;
                return Ok(RecordId {
                    page_id: PageId(page_no),
                    slot: slot_idx,
                });
            }
            pinner.unpin(&self.path, page_no, false)?;
            candidate = next;
        }

        let page_no = header.num_pages;
        header.num_pages += 1;
        pinner.pin(&self.path, page_no, true)?;
        let page = pinner.page_mut(&self.path, page_no)?;
        write_footer(page, NONE_PAGE, 0, false)?;
        let slot_idx = try_insert_into_page(page, &bytes)?.ok_or_else(|| {
            DbError::IllegalState(
                "tuple that passed the page-capacity check did not fit on a fresh page".into(),
            )
        })?;
        let (_, num_slots, _) = read_footer(page)?;
        if worst_case_avail(page, num_slots)? > 0 {
            write_footer(page, header.free_list_head, num_slots, true)?;
            header.free_list_head = page_no as u32;
        }
        pinner.unpin(&self.path, page_no, true)?;
        bump_stats(&mut header.stats, values);
        self.write_header(pinner, &header)?;
        Ok(RecordId {
            page_id: PageId(page_no),
            slot: slot_idx,
        })
    }

    pub fn get_tuple(&self, pinner: &mut dyn PagePinner, rid: RecordId) -> DbResult<Vec<Value>> {
        let header = self.read_header(pinner)?;
        let page_no = rid.page_id.0;
        pinner.pin(&self.path, page_no, false)?;
        let page = pinner.page_mut(&self.path, page_no)?;
        let bytes = read_tuple_bytes(page, rid.slot)?;
        pinner.unpin(&self.path, page_no, false)?;
        decode_tuple(&header.schema, &bytes)
    }

    /// Delete a tuple, linking its page onto the free list if it was not
    /// already on it and now has room.
    pub fn delete_tuple(&self, pinner: &mut dyn PagePinner, rid: RecordId) -> DbResult<()> {
        let mut header = self.read_header(pinner)?;
        let page_no = rid.page_id.0;
        pinner.pin(&self.path, page_no, false)?;
        let page = pinner.page_mut(&self.path, page_no)?;
        let old_values = decode_tuple(&header.schema, &read_tuple_bytes(page, rid.slot)?)?;
        delete_from_page(page, rid.slot)?;

        let (_, num_slots, on_free_list) = read_footer(page)?;
        if !on_free_list && worst_case_avail(page, num_slots)? > 0 {
            write_footer(page, header.free_list_head, num_slots, true)?;
            header.free_list_head = page_no as u32;
        }
        pinner.unpin(&self.path, page_no, true)?;
        unbump_stats(&mut header.stats, &old_values);
        self.write_header(pinner, &header)?;
        Ok(())
    }

    /// Update a tuple in place. Fails with `PageFullOnUpdate` if the new
    /// value does not fit back into the tuple's own page — relocation
    /// across pages is a non-goal.
    pub fn update_tuple(
        &self,
        pinner: &mut dyn PagePinner,
        rid: RecordId,
        values: &[Value],
    ) -> DbResult<()> {
        let mut header = self.read_header(pinner)?;
        let new_bytes = encode_tuple(&header.schema, values)?;
        let page_no = rid.page_id.0;
        pinner.pin(&self.path, page_no, false)?;
        let page = pinner.page_mut(&self.path, page_no)?;
        let old_values = decode_tuple(&header.schema, &read_tuple_bytes(page, rid.slot)?)?;
        let fit = update_in_page(page, rid.slot, &new_bytes)?;
        if !fit {
            pinner.unpin(&self.path, page_no, false)?;
            return Err(DbError::PageFullOnUpdate(format!(
                "updated tuple of {} bytes does not fit back into page {page_no}",
                new_bytes.len()
            )));
        }

        let (free_next, num_slots, on_free_list) = read_footer(page)?;
        if on_free_list && worst_case_avail(page, num_slots)? <= 0 {
            write_footer(page, free_next, num_slots, false)?;
            header.free_list_head = free_next;
        }
        pinner.unpin(&self.path, page_no, true)?;
        unbump_stats(&mut header.stats, &old_values);
        bump_stats(&mut header.stats, values);
        self.write_header(pinner, &header)?;
        Ok(())
    }

    /// The first live tuple in page order, or `None` if the table is
    /// empty.
    pub fn first_tuple(&self, pinner: &mut dyn PagePinner) -> DbResult<Option<RecordId>> {
        let header = self.read_header(pinner)?;
        self.scan_from(pinner, 1, 0, header.num_pages)
    }

    /// The next live tuple after `prev` in page order, or `None` at
    /// end-of-table.
    pub fn next_tuple(
        &self,
        pinner: &mut dyn PagePinner,
        prev: RecordId,
    ) -> DbResult<Option<RecordId>> {
        let header = self.read_header(pinner)?;
        self.scan_from(pinner, prev.page_id.0, prev.slot.saturating_add(1), header.num_pages)
    }

    fn scan_from(
        &self,
        pinner: &mut dyn PagePinner,
        mut page_no: u64,
        mut slot: u16,
        num_pages: u64,
    ) -> DbResult<Option<RecordId>> {
        while page_no < num_pages {
            pinner.pin(&self.path, page_no, false)?;
            let page = pinner.page_mut(&self.path, page_no)?;
            let num_slots = read_footer(page)?.1;
            while slot < num_slots {
                if read_slot(page, slot)?.1 > 0 {
                    pinner.unpin(&self.path, page_no, false)?;
                    return Ok(Some(RecordId {
                        page_id: PageId(page_no),
                        slot,
                    }));
                }
                slot += 1;
            }
            pinner.unpin(&self.path, page_no, false)?;
            page_no += 1;
            slot = 0;
        }
        Ok(None)
    }

    /// Recompute column statistics by scanning every live tuple, and
    /// persist them to the header page.
    pub fn analyze(&self, pinner: &mut dyn PagePinner) -> DbResult<TableStats> {
        let mut header = self.read_header(pinner)?;
        let mut stats = TableStats::new(header.schema.len());
        let mut distinct: Vec<HashSet<Value>> = vec![HashSet::new(); header.schema.len()];
        let mut cursor = self.first_tuple(pinner)?;
        while let Some(rid) = cursor {
            let values = self.get_tuple(pinner, rid)?;
            bump_stats(&mut stats, &values);
            stats.total_tuple_bytes += encode_tuple(&header.schema, &values)?.len() as u64;
            for (seen, value) in distinct.iter_mut().zip(&values) {
                if !matches!(value, Value::Null) {
                    seen.insert(value.clone());
                }
            }
            cursor = self.next_tuple(pinner, rid)?;
        }
        for (column_stats, seen) in stats.columns.iter_mut().zip(&distinct) {
            column_stats.distinct_count = seen.len() as u64;
        }
        stats.num_pages = header.num_pages.saturating_sub(1);
        header.stats = stats.clone();
        self.write_header(pinner, &header)?;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::DirectPinner;
    use catalog::Column;
    use tempfile::tempdir;
    use types::SqlType;

    fn schema() -> TableSchema {
        TableSchema::try_new(vec![
            Column::new("id", SqlType::Int),
            Column::new("name", SqlType::Text),
        ])
        .unwrap()
    }

    fn open_heap(page_size: usize) -> (tempfile::TempDir, HeapFile, DirectPinner) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.heap");
        let heap = HeapFile::create(&path, schema(), page_size).unwrap();
        let file = DbFile::open(&path).unwrap().unwrap();
        let pinner = DirectPinner::new(file);
        (dir, heap, pinner)
    }

    #[test]
    fn insert_get_round_trips() {
        let (_dir, heap, mut pinner) = open_heap(512);
        let rid = heap
            .insert_tuple(&mut pinner, &[Value::Int(1), Value::Text("alice".into())])
            .unwrap();
        let values = heap.get_tuple(&mut pinner, rid).unwrap();
        assert_eq!(values, vec![Value::Int(1), Value::Text("alice".into())]);
    }

    #[test]
    fn delete_then_reinsert_reuses_slot() {
        let (_dir, heap, mut pinner) = open_heap(512);
        let rid1 = heap
            .insert_tuple(&mut pinner, &[Value::Int(1), Value::Text("a".into())])
            .unwrap();
        heap.delete_tuple(&mut pinner, rid1).unwrap();
        let rid2 = heap
            .insert_tuple(&mut pinner, &[Value::Int(2), Value::Text("b".into())])
            .unwrap();
        assert_eq!(rid1.page_id, rid2.page_id);
        assert_eq!(rid1.slot, rid2.slot);
        assert_eq!(
            heap.get_tuple(&mut pinner, rid2).unwrap(),
            vec![Value::Int(2), Value::Text("b".into())]
        );
    }

    #[test]
    fn update_in_place_with_shorter_and_longer_value() {
        let (_dir, heap, mut pinner) = open_heap(512);
        let rid = heap
            .insert_tuple(&mut pinner, &[Value::Int(1), Value::Text("short".into())])
            .unwrap();
        heap.update_tuple(&mut pinner, rid, &[Value::Int(1), Value::Text("a".into())])
            .unwrap();
        assert_eq!(
            heap.get_tuple(&mut pinner, rid).unwrap(),
            vec![Value::Int(1), Value::Text("a".into())]
        );
        heap.update_tuple(
            &mut pinner,
            rid,
            &[Value::Int(1), Value::Text("a longer value than before".into())],
        )
        .unwrap();
        assert_eq!(
            heap.get_tuple(&mut pinner, rid).unwrap(),
            vec![Value::Int(1), Value::Text("a longer value than before".into())]
        );
    }

    #[test]
    fn update_that_cannot_fit_fails_without_corrupting_page() {
        let (_dir, heap, mut pinner) = open_heap(64);
        let rid = heap
            .insert_tuple(&mut pinner, &[Value::Int(1), Value::Text("x".into())])
            .unwrap();
        let huge = "y".repeat(100);
        let err = heap
            .update_tuple(&mut pinner, rid, &[Value::Int(1), Value::Text(huge)])
            .unwrap_err();
        assert!(matches!(err, DbError::PageFullOnUpdate(_) | DbError::TupleTooLarge(_)));
        assert_eq!(
            heap.get_tuple(&mut pinner, rid).unwrap(),
            vec![Value::Int(1), Value::Text("x".into())]
        );
    }

    #[test]
    fn scan_visits_every_live_tuple_across_pages() {
        let (_dir, heap, mut pinner) = open_heap(128);
        let mut inserted = Vec::new();
        for i in 0..20 {
            let rid = heap
                .insert_tuple(&mut pinner, &[Value::Int(i), Value::Text(format!("row{i}"))])
                .unwrap();
            inserted.push(rid);
        }

        let mut seen = Vec::new();
        let mut cursor = heap.first_tuple(&mut pinner).unwrap();
        while let Some(rid) = cursor {
            seen.push(heap.get_tuple(&mut pinner, rid).unwrap()[0].clone());
            cursor = heap.next_tuple(&mut pinner, rid).unwrap();
        }
        assert_eq!(seen.len(), 20);
        assert_eq!(seen[0], Value::Int(0));
        assert_eq!(seen[19], Value::Int(19));
    }

    #[test]
    fn deleted_tuple_is_skipped_by_scan() {
        let (_dir, heap, mut pinner) = open_heap(128);
        let rid1 = heap
            .insert_tuple(&mut pinner, &[Value::Int(1), Value::Text("a".into())])
            .unwrap();
        let _rid2 = heap
            .insert_tuple(&mut pinner, &[Value::Int(2), Value::Text("b".into())])
            .unwrap();
        heap.delete_tuple(&mut pinner, rid1).unwrap();

        let mut seen = Vec::new();
        let mut cursor = heap.first_tuple(&mut pinner).unwrap();
        while let Some(rid) = cursor {
            seen.push(heap.get_tuple(&mut pinner, rid).unwrap()[0].clone());
            cursor = heap.next_tuple(&mut pinner, rid).unwrap();
        }
        assert_eq!(seen, vec![Value::Int(2)]);
    }

    #[test]
    fn free_list_reclaims_deleted_space_for_new_pages() {
        let (_dir, heap, mut pinner) = open_heap(64);
        let mut rids = Vec::new();
        for i in 0..3 {
            rids.push(
                heap.insert_tuple(&mut pinner, &[Value::Int(i), Value::Text("x".into())])
                    .unwrap(),
            );
        }
        for rid in &rids {
            heap.delete_tuple(&mut pinner, *rid).unwrap();
        }
        // The page should be fully reusable now; this must not allocate a
        // brand-new page per insert.
        let header_before = heap.read_header(&mut pinner).unwrap();
        heap.insert_tuple(&mut pinner, &[Value::Int(99), Value::Text("y".into())])
            .unwrap();
        let header_after = heap.read_header(&mut pinner).unwrap();
        assert_eq!(header_before.num_pages, header_after.num_pages);
    }

    #[test]
    fn analyze_recomputes_column_stats() {
        let (_dir, heap, mut pinner) = open_heap(512);
        heap.insert_tuple(&mut pinner, &[Value::Int(5), Value::Text("abc".into())])
            .unwrap();
        heap.insert_tuple(&mut pinner, &[Value::Int(10), Value::Null])
            .unwrap();
        heap.insert_tuple(&mut pinner, &[Value::Int(10), Value::Text("abc".into())])
            .unwrap();

        let stats = heap.analyze(&mut pinner).unwrap();
        assert_eq!(stats.row_count, 3);
        assert_eq!(stats.columns[0].min_int, Some(5));
        assert_eq!(stats.columns[0].max_int, Some(10));
        assert_eq!(stats.columns[1].null_count, 1);
        // column 0 has two distinct ints (5, 10); column 1 has one distinct
        // non-null text ("abc") shared by two rows, plus a null excluded
        // from the distinct count.
        assert_eq!(stats.columns[0].distinct_count, 2);
        assert_eq!(stats.columns[1].distinct_count, 1);
        assert_eq!(stats.num_pages, 1);
        assert!(stats.total_tuple_bytes > 0);
    }

    #[test]
    fn oversize_tuple_is_rejected_up_front() {
        let (_dir, heap, mut pinner) = open_heap(64);
        let huge = "z".repeat(1000);
        let err = heap
            .insert_tuple(&mut pinner, &[Value::Int(1), Value::Text(huge)])
            .unwrap_err();
        assert!(matches!(err, DbError::TupleTooLarge(_)));
    }
}
