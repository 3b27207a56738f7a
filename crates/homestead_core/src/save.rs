//! Binary save codec.
//!
//! A save is one contiguous arena buffer. Leaf arrays are written first
//! and the records referring to them carry `count`/`offset` pairs, so a
//! decoder restores each pair as a contiguous array copy. Offsets are
//! only meaningful inside the snapshot that produced them; re-encoding
//! allocates fresh ones. All integers are little-endian, floats are
//! IEEE-754 bit patterns, and records are packed without padding.
//!
//! Decoding is bounds-checked at every read and never panics on
//! malformed input; corruption surfaces as
//! [`CoreError::CorruptSave`] naming the offset and the field being
//! read.

use std::collections::BTreeSet;
use std::path::Path as FilePath;

use crate::agent::{Agent, AgentId, AgentState, Target, TargetAction, VehicleParams};
use crate::complex::{Complex, ComplexBank, ComplexId, Conversion, Member};
use crate::error::{CoreError, Result};
use crate::items::{ItemCount, ItemId, ItemStore};
use crate::math::{TileCoord, TileRect, Vec3};
use crate::pathfinding::Path;
use crate::vehicles::{Carriage, DraftAnimal};

/// File identifier, `HSTD` read as a little-endian `u32`.
pub const SAVE_MAGIC: u32 = u32::from_le_bytes(*b"HSTD");

/// Format version this build writes and accepts.
pub const SAVE_VERSION: u32 = 1;

const CONVERSION_RECORD_SIZE: usize = 32;
const MEMBER_RECORD_SIZE: usize = 24;
const COMPLEX_RECORD_SIZE: usize = 32;
const ITEM_PAIR_SIZE: usize = 6;
const TARGET_RECORD_SIZE: usize = 15;
const WAYPOINT_SIZE: usize = 24;
const CARRIAGE_RECORD_SIZE: usize = 123;

/// Everything a save restores besides the world itself.
#[derive(Debug, Clone)]
pub struct SaveData {
    /// Tick counter at save time.
    pub tick: u64,
    /// Deterministic RNG state at save time.
    pub rng_state: u64,
    /// The complex pool, free slots included.
    pub bank: ComplexBank,
    /// Every carriage, mid-journey state included.
    pub carriages: Vec<Carriage>,
}

/// Append-only buffer for encoding one save snapshot.
///
/// Values are appended little-endian; [`ArenaWriter::offset`] before a
/// group of writes yields the offset a record stores for that group.
#[derive(Debug, Default)]
pub struct ArenaWriter {
    buffer: Vec<u8>,
}

impl ArenaWriter {
    /// Create an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Byte offset the next write lands at.
    #[must_use]
    pub fn offset(&self) -> u32 {
        #[allow(clippy::cast_possible_truncation)]
        {
            self.buffer.len() as u32
        }
    }

    /// Append a byte.
    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    /// Append a little-endian `u16`.
    pub fn write_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Append a little-endian `u32`.
    pub fn write_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Append a little-endian `u64`.
    pub fn write_u64(&mut self, value: u64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Append an `f64` as its IEEE-754 bit pattern.
    pub fn write_f64(&mut self, value: f64) {
        self.write_u64(value.to_bits());
    }

    /// Append `len` zero bytes.
    pub fn write_zeros(&mut self, len: usize) {
        self.buffer.resize(self.buffer.len() + len, 0);
    }

    /// Append a zeroed `u32` slot and return its offset for later
    /// patching.
    pub fn reserve_u32(&mut self) -> u32 {
        let offset = self.offset();
        self.write_u32(0);
        offset
    }

    /// Overwrite a previously written `u32` in place.
    ///
    /// # Panics
    /// Panics if `offset` does not point at four written bytes.
    pub fn patch_u32(&mut self, offset: u32, value: u32) {
        let at = offset as usize;
        self.buffer[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Bytes written so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether nothing has been written yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Consume the writer and return the finished buffer.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }
}

/// Bounds-checked random-access view over a save buffer.
#[derive(Debug, Clone, Copy)]
pub struct ArenaReader<'a> {
    bytes: &'a [u8],
}

impl<'a> ArenaReader<'a> {
    /// Wrap a byte buffer for decoding.
    #[must_use]
    pub const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    /// Total buffer length.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the buffer is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Read a byte.
    ///
    /// # Errors
    /// Returns [`CoreError::CorruptSave`] when `offset` is past the end.
    pub fn read_u8(&self, offset: usize, field: &'static str) -> Result<u8> {
        self.bytes
            .get(offset)
            .copied()
            .ok_or_else(|| truncated(offset, field))
    }

    /// Read a little-endian `u16`.
    ///
    /// # Errors
    /// Returns [`CoreError::CorruptSave`] when the read leaves the buffer.
    pub fn read_u16(&self, offset: usize, field: &'static str) -> Result<u16> {
        Ok(u16::from_le_bytes(self.array::<2>(offset, field)?))
    }

    /// Read a little-endian `u32`.
    ///
    /// # Errors
    /// Returns [`CoreError::CorruptSave`] when the read leaves the buffer.
    pub fn read_u32(&self, offset: usize, field: &'static str) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array::<4>(offset, field)?))
    }

    /// Read a little-endian `u64`.
    ///
    /// # Errors
    /// Returns [`CoreError::CorruptSave`] when the read leaves the buffer.
    pub fn read_u64(&self, offset: usize, field: &'static str) -> Result<u64> {
        Ok(u64::from_le_bytes(self.array::<8>(offset, field)?))
    }

    /// Read an `f64` from its IEEE-754 bit pattern.
    ///
    /// # Errors
    /// Returns [`CoreError::CorruptSave`] when the read leaves the buffer.
    pub fn read_f64(&self, offset: usize, field: &'static str) -> Result<f64> {
        Ok(f64::from_bits(self.read_u64(offset, field)?))
    }

    /// Validate that `count` records of `record_size` bytes starting at
    /// `offset` lie inside the buffer.
    ///
    /// # Errors
    /// Returns [`CoreError::CorruptSave`] when the span leaves the buffer.
    pub fn check_array(
        &self,
        offset: u32,
        count: u32,
        record_size: usize,
        field: &'static str,
    ) -> Result<()> {
        let end = (count as usize)
            .checked_mul(record_size)
            .and_then(|span| (offset as usize).checked_add(span));
        match end {
            Some(end) if end <= self.bytes.len() => Ok(()),
            _ => Err(CoreError::CorruptSave {
                offset: offset as usize,
                message: format!("{field} array out of range"),
            }),
        }
    }

    fn array<const N: usize>(&self, offset: usize, field: &'static str) -> Result<[u8; N]> {
        match offset.checked_add(N) {
            Some(end) if end <= self.bytes.len() => {
                let mut out = [0u8; N];
                out.copy_from_slice(&self.bytes[offset..end]);
                Ok(out)
            }
            _ => Err(truncated(offset, field)),
        }
    }
}

fn truncated(offset: usize, field: &'static str) -> CoreError {
    CoreError::CorruptSave {
        offset,
        message: format!("truncated read of {field}"),
    }
}

/// Sequential reads over an [`ArenaReader`], advancing through one
/// record.
struct Cursor<'a> {
    reader: &'a ArenaReader<'a>,
    offset: usize,
}

impl<'a> Cursor<'a> {
    fn new(reader: &'a ArenaReader<'a>, offset: usize) -> Self {
        Self { reader, offset }
    }

    fn position(&self) -> usize {
        self.offset
    }

    fn u8(&mut self, field: &'static str) -> Result<u8> {
        let value = self.reader.read_u8(self.offset, field)?;
        self.offset += 1;
        Ok(value)
    }

    fn u16(&mut self, field: &'static str) -> Result<u16> {
        let value = self.reader.read_u16(self.offset, field)?;
        self.offset += 2;
        Ok(value)
    }

    fn u32(&mut self, field: &'static str) -> Result<u32> {
        let value = self.reader.read_u32(self.offset, field)?;
        self.offset += 4;
        Ok(value)
    }

    fn u64(&mut self, field: &'static str) -> Result<u64> {
        let value = self.reader.read_u64(self.offset, field)?;
        self.offset += 8;
        Ok(value)
    }

    fn f64(&mut self, field: &'static str) -> Result<f64> {
        let value = self.reader.read_f64(self.offset, field)?;
        self.offset += 8;
        Ok(value)
    }
}

#[allow(clippy::cast_possible_truncation)]
fn to_u32(value: usize) -> u32 {
    value as u32
}

/// Encode a full snapshot into one arena buffer.
#[must_use]
pub fn encode(tick: u64, rng_state: u64, bank: &ComplexBank, carriages: &[Carriage]) -> Vec<u8> {
    let mut writer = ArenaWriter::new();
    writer.write_u32(SAVE_MAGIC);
    writer.write_u32(SAVE_VERSION);
    writer.write_u64(tick);
    writer.write_u64(rng_state);
    let bank_slot = writer.reserve_u32();
    let carriages_count_slot = writer.reserve_u32();
    let carriages_offset_slot = writer.reserve_u32();

    let bank_offset = encode_bank(&mut writer, bank);
    writer.patch_u32(bank_slot, bank_offset);

    let leaves: Vec<CarriageRef> = carriages
        .iter()
        .map(|carriage| encode_carriage_leaves(&mut writer, carriage))
        .collect();
    let carriages_offset = writer.offset();
    for (carriage, leaf) in carriages.iter().zip(&leaves) {
        write_carriage_record(&mut writer, carriage, leaf);
    }
    writer.patch_u32(carriages_count_slot, to_u32(carriages.len()));
    writer.patch_u32(carriages_offset_slot, carriages_offset);

    writer.into_bytes()
}

/// Decode a snapshot produced by [`encode`].
///
/// # Errors
/// Returns [`CoreError::CorruptSave`] for malformed buffers and
/// [`CoreError::UnsupportedSaveVersion`] for version mismatches.
pub fn decode(bytes: &[u8]) -> Result<SaveData> {
    let reader = ArenaReader::new(bytes);
    let mut header = Cursor::new(&reader, 0);

    let magic = header.u32("magic")?;
    if magic != SAVE_MAGIC {
        return Err(CoreError::CorruptSave {
            offset: 0,
            message: format!("bad magic {magic:#010x}"),
        });
    }
    let version = header.u32("version")?;
    if version != SAVE_VERSION {
        return Err(CoreError::UnsupportedSaveVersion {
            found: version,
            expected: SAVE_VERSION,
        });
    }
    let tick = header.u64("tick")?;
    let rng_state = header.u64("rng state")?;
    let bank_offset = header.u32("bank offset")?;
    let carriages_count = header.u32("carriage count")?;
    let carriages_offset = header.u32("carriages offset")?;

    let bank = decode_bank(&reader, bank_offset)?;

    reader.check_array(
        carriages_offset,
        carriages_count,
        CARRIAGE_RECORD_SIZE,
        "carriage record",
    )?;
    let mut carriages = Vec::with_capacity(carriages_count as usize);
    for index in 0..carriages_count as usize {
        let offset = carriages_offset as usize + index * CARRIAGE_RECORD_SIZE;
        carriages.push(decode_carriage(&reader, offset)?);
    }

    Ok(SaveData {
        tick,
        rng_state,
        bank,
        carriages,
    })
}

/// Write save bytes to a file.
///
/// # Errors
/// Returns [`CoreError::Io`] when the file cannot be written.
pub fn save_to_file<P: AsRef<FilePath>>(path: P, bytes: &[u8]) -> Result<()> {
    std::fs::write(path.as_ref(), bytes)?;
    Ok(())
}

/// Read and decode a save file.
///
/// # Errors
/// Returns [`CoreError::Io`] when the file cannot be read, plus any
/// error [`decode`] reports.
pub fn load_from_file<P: AsRef<FilePath>>(path: P) -> Result<SaveData> {
    let bytes = std::fs::read(path.as_ref())?;
    decode(&bytes)
}

struct ConversionRef {
    inputs_count: u32,
    inputs_offset: u32,
    outputs_count: u32,
    outputs_offset: u32,
    period: f64,
    elapsed: f64,
}

struct MemberRef {
    tile: TileCoord,
    max: TileCoord,
    conversions_count: u32,
    conversions_offset: u32,
}

struct ComplexRef {
    center_x: f64,
    center_z: f64,
    members_count: u32,
    members_offset: u32,
    storage_count: u32,
    storage_offset: u32,
}

struct CarriageRef {
    schedule_count: u32,
    schedule_offset: u32,
    items_count: u32,
    items_offset: u32,
    has_path: bool,
    waypoints_count: u32,
    waypoints_offset: u32,
    animals_count: u32,
    animals_offset: u32,
}

fn write_count_pairs(writer: &mut ArenaWriter, counts: &[ItemCount]) -> (u32, u32) {
    let offset = writer.offset();
    for entry in counts {
        writer.write_u16(entry.item.as_u16());
        writer.write_u32(entry.count);
    }
    (to_u32(counts.len()), offset)
}

fn write_item_pairs(writer: &mut ArenaWriter, store: &ItemStore) -> (u32, u32) {
    let offset = writer.offset();
    let mut count = 0u32;
    for (item, amount) in store.iter() {
        writer.write_u16(item.as_u16());
        writer.write_u32(amount);
        count += 1;
    }
    (count, offset)
}

fn encode_complex_leaves(writer: &mut ArenaWriter, complex: &Complex) -> ComplexRef {
    let mut member_refs = Vec::with_capacity(complex.member_count());
    for (tile, member) in complex.members() {
        let mut conversion_refs = Vec::with_capacity(member.conversions().len());
        for conversion in member.conversions() {
            let (inputs_count, inputs_offset) = write_count_pairs(writer, conversion.inputs());
            let (outputs_count, outputs_offset) = write_count_pairs(writer, conversion.outputs());
            conversion_refs.push(ConversionRef {
                inputs_count,
                inputs_offset,
                outputs_count,
                outputs_offset,
                period: conversion.period(),
                elapsed: conversion.elapsed(),
            });
        }
        let conversions_offset = writer.offset();
        for conversion in &conversion_refs {
            let start = writer.offset();
            writer.write_u32(conversion.inputs_count);
            writer.write_u32(conversion.inputs_offset);
            writer.write_u32(conversion.outputs_count);
            writer.write_u32(conversion.outputs_offset);
            writer.write_f64(conversion.period);
            writer.write_f64(conversion.elapsed);
            debug_assert_eq!((writer.offset() - start) as usize, CONVERSION_RECORD_SIZE);
        }
        member_refs.push(MemberRef {
            tile,
            max: member.footprint().max,
            conversions_count: to_u32(conversion_refs.len()),
            conversions_offset,
        });
    }

    let members_offset = writer.offset();
    for member in &member_refs {
        let start = writer.offset();
        writer.write_u32(member.tile.x);
        writer.write_u32(member.tile.z);
        writer.write_u32(member.max.x);
        writer.write_u32(member.max.z);
        writer.write_u32(member.conversions_count);
        writer.write_u32(member.conversions_offset);
        debug_assert_eq!((writer.offset() - start) as usize, MEMBER_RECORD_SIZE);
    }

    let (storage_count, storage_offset) = write_item_pairs(writer, complex.storage());
    let (center_x, center_z) = complex.center();
    ComplexRef {
        center_x,
        center_z,
        members_count: to_u32(member_refs.len()),
        members_offset,
        storage_count,
        storage_offset,
    }
}

fn encode_bank(writer: &mut ArenaWriter, bank: &ComplexBank) -> u32 {
    let slots = bank.slots();
    let refs: Vec<Option<ComplexRef>> = slots
        .iter()
        .map(|slot| {
            slot.as_ref()
                .map(|complex| encode_complex_leaves(writer, complex))
        })
        .collect();

    let complexes_offset = writer.offset();
    for slot in &refs {
        match slot {
            Some(complex) => {
                let start = writer.offset();
                writer.write_f64(complex.center_x);
                writer.write_f64(complex.center_z);
                writer.write_u32(complex.members_count);
                writer.write_u32(complex.members_offset);
                writer.write_u32(complex.storage_count);
                writer.write_u32(complex.storage_offset);
                debug_assert_eq!((writer.offset() - start) as usize, COMPLEX_RECORD_SIZE);
            }
            None => writer.write_zeros(COMPLEX_RECORD_SIZE),
        }
    }

    let free_offset = writer.offset();
    let mut free_count = 0u32;
    for (index, slot) in slots.iter().enumerate() {
        if slot.is_none() {
            writer.write_u32(to_u32(index));
            free_count += 1;
        }
    }

    let bank_offset = writer.offset();
    writer.write_u32(to_u32(slots.len()));
    writer.write_u32(complexes_offset);
    writer.write_u32(free_count);
    writer.write_u32(free_offset);
    bank_offset
}

fn encode_carriage_leaves(writer: &mut ArenaWriter, carriage: &Carriage) -> CarriageRef {
    let agent = &carriage.agent;

    let schedule_offset = writer.offset();
    for target in &agent.schedule {
        let start = writer.offset();
        writer.write_u32(target.complex.0);
        let (tag, amount) = match target.action {
            TargetAction::LoadFixed(count) => (0, f64::from(count)),
            TargetAction::LoadPercentage(fraction) => (1, fraction),
            TargetAction::PutFixed(count) => (2, f64::from(count)),
            TargetAction::PutPercentage(fraction) => (3, fraction),
        };
        writer.write_u8(tag);
        writer.write_f64(amount);
        writer.write_u16(target.item.as_u16());
        debug_assert_eq!((writer.offset() - start) as usize, TARGET_RECORD_SIZE);
    }

    let (items_count, items_offset) = write_item_pairs(writer, &agent.items);

    let waypoints_offset = writer.offset();
    let mut waypoints_count = 0;
    if let Some(path) = &agent.path {
        for point in path.points() {
            writer.write_f64(point.x);
            writer.write_f64(point.y);
            writer.write_f64(point.z);
        }
        waypoints_count = to_u32(path.points().len());
    }

    let animals_offset = writer.offset();
    for animal in &carriage.animals {
        writer.write_f64(animal.offset);
    }

    CarriageRef {
        schedule_count: to_u32(agent.schedule.len()),
        schedule_offset,
        items_count,
        items_offset,
        has_path: agent.path.is_some(),
        waypoints_count,
        waypoints_offset,
        animals_count: to_u32(carriage.animals.len()),
        animals_offset,
    }
}

fn write_carriage_record(writer: &mut ArenaWriter, carriage: &Carriage, leaves: &CarriageRef) {
    let agent = &carriage.agent;
    let start = writer.offset();
    writer.write_u32(agent.id.0);
    writer.write_f64(agent.position.x);
    writer.write_f64(agent.position.y);
    writer.write_f64(agent.position.z);
    writer.write_f64(agent.yaw);
    writer.write_f64(agent.pitch);
    writer.write_u8(match agent.state {
        AgentState::Travelling => 0,
        AgentState::Loading => 1,
        AgentState::Lost => 2,
    });
    writer.write_u32(leaves.schedule_count);
    writer.write_u32(leaves.schedule_offset);
    writer.write_u32(to_u32(agent.curr_target_i));
    writer.write_u32(leaves.items_count);
    writer.write_u32(leaves.items_offset);
    writer.write_u8(u8::from(leaves.has_path));
    writer.write_u32(leaves.waypoints_count);
    writer.write_u32(leaves.waypoints_offset);
    writer.write_f64(agent.path_progress);
    writer.write_f64(agent.load_timer);
    writer.write_u8(u8::from(agent.lost_reported));
    writer.write_f64(agent.params.speed);
    writer.write_f64(agent.params.load_duration);
    writer.write_f64(agent.params.step_sound_period);
    writer.write_u32(leaves.animals_count);
    writer.write_u32(leaves.animals_offset);
    debug_assert_eq!((writer.offset() - start) as usize, CARRIAGE_RECORD_SIZE);
}

fn decode_item_counts(reader: &ArenaReader, count: u32, offset: u32) -> Result<Vec<ItemCount>> {
    reader.check_array(offset, count, ITEM_PAIR_SIZE, "item pair")?;
    let mut cursor = Cursor::new(reader, offset as usize);
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let item = cursor.u16("item id")?;
        let amount = cursor.u32("item count")?;
        out.push(ItemCount::new(amount, ItemId::new(item)));
    }
    Ok(out)
}

fn decode_store(reader: &ArenaReader, count: u32, offset: u32) -> Result<ItemStore> {
    let mut store = ItemStore::new();
    for entry in decode_item_counts(reader, count, offset)? {
        store.set(entry.item, entry.count);
    }
    Ok(store)
}

fn decode_conversion(reader: &ArenaReader, offset: usize) -> Result<Conversion> {
    let mut cursor = Cursor::new(reader, offset);
    let inputs_count = cursor.u32("input count")?;
    let inputs_offset = cursor.u32("inputs offset")?;
    let outputs_count = cursor.u32("output count")?;
    let outputs_offset = cursor.u32("outputs offset")?;
    let period_at = cursor.position();
    let period = cursor.f64("conversion period")?;
    let elapsed_at = cursor.position();
    let elapsed = cursor.f64("conversion elapsed")?;

    if !period.is_finite() || period <= 0.0 {
        return Err(CoreError::CorruptSave {
            offset: period_at,
            message: format!("conversion period must be positive, got {period}"),
        });
    }
    if !elapsed.is_finite() {
        return Err(CoreError::CorruptSave {
            offset: elapsed_at,
            message: "conversion elapsed is not finite".to_string(),
        });
    }

    let inputs = decode_item_counts(reader, inputs_count, inputs_offset)?;
    let outputs = decode_item_counts(reader, outputs_count, outputs_offset)?;
    let mut conversion = Conversion::new(inputs, outputs, period);
    conversion.set_elapsed(elapsed);
    Ok(conversion)
}

fn decode_member(reader: &ArenaReader, offset: usize) -> Result<(TileCoord, Member)> {
    let mut cursor = Cursor::new(reader, offset);
    let x = cursor.u32("member tile x")?;
    let z = cursor.u32("member tile z")?;
    let max_x = cursor.u32("member max x")?;
    let max_z = cursor.u32("member max z")?;
    let conversions_count = cursor.u32("conversion count")?;
    let conversions_offset = cursor.u32("conversions offset")?;

    reader.check_array(
        conversions_offset,
        conversions_count,
        CONVERSION_RECORD_SIZE,
        "conversion record",
    )?;
    let mut conversions = Vec::with_capacity(conversions_count as usize);
    for index in 0..conversions_count as usize {
        let at = conversions_offset as usize + index * CONVERSION_RECORD_SIZE;
        conversions.push(decode_conversion(reader, at)?);
    }

    let tile = TileCoord::new(x, z);
    let footprint = TileRect::new(tile, TileCoord::new(max_x, max_z));
    Ok((tile, Member::new(footprint).with_conversions(conversions)))
}

fn decode_complex(reader: &ArenaReader, offset: usize) -> Result<Complex> {
    let mut cursor = Cursor::new(reader, offset);
    // The centroid is recomputed as members are re-added.
    let _center_x = cursor.f64("center x")?;
    let _center_z = cursor.f64("center z")?;
    let members_count = cursor.u32("member count")?;
    let members_offset = cursor.u32("members offset")?;
    let storage_count = cursor.u32("storage count")?;
    let storage_offset = cursor.u32("storage offset")?;

    reader.check_array(
        members_offset,
        members_count,
        MEMBER_RECORD_SIZE,
        "member record",
    )?;
    let mut complex = Complex::new();
    for index in 0..members_count as usize {
        let at = members_offset as usize + index * MEMBER_RECORD_SIZE;
        let (tile, member) = decode_member(reader, at)?;
        complex.add_member(tile, member);
    }

    for entry in decode_item_counts(reader, storage_count, storage_offset)? {
        complex.set_stored(entry.item, entry.count);
    }
    Ok(complex)
}

fn decode_bank(reader: &ArenaReader, offset: u32) -> Result<ComplexBank> {
    let mut cursor = Cursor::new(reader, offset as usize);
    let complexes_count = cursor.u32("complex count")?;
    let complexes_offset = cursor.u32("complexes offset")?;
    let free_count = cursor.u32("free count")?;
    let free_offset = cursor.u32("free list offset")?;

    reader.check_array(free_offset, free_count, 4, "free index")?;
    let mut free = BTreeSet::new();
    let mut free_cursor = Cursor::new(reader, free_offset as usize);
    for _ in 0..free_count {
        let at = free_cursor.position();
        let index = free_cursor.u32("free index")?;
        if index >= complexes_count {
            return Err(CoreError::CorruptSave {
                offset: at,
                message: format!("free index {index} out of range"),
            });
        }
        free.insert(index);
    }

    reader.check_array(
        complexes_offset,
        complexes_count,
        COMPLEX_RECORD_SIZE,
        "complex record",
    )?;
    let mut slots = Vec::with_capacity(complexes_count as usize);
    for index in 0..complexes_count {
        if free.contains(&index) {
            slots.push(None);
        } else {
            let at = complexes_offset as usize + index as usize * COMPLEX_RECORD_SIZE;
            slots.push(Some(decode_complex(reader, at)?));
        }
    }
    Ok(ComplexBank::from_slots(slots))
}

fn decode_targets(reader: &ArenaReader, count: u32, offset: u32) -> Result<Vec<Target>> {
    reader.check_array(offset, count, TARGET_RECORD_SIZE, "schedule entry")?;
    let mut cursor = Cursor::new(reader, offset as usize);
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let complex = cursor.u32("target complex")?;
        let tag_at = cursor.position();
        let tag = cursor.u8("target action tag")?;
        let amount = cursor.f64("target amount")?;
        let item = cursor.u16("target item")?;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let action = match tag {
            0 => TargetAction::LoadFixed(amount as u32),
            1 => TargetAction::LoadPercentage(amount),
            2 => TargetAction::PutFixed(amount as u32),
            3 => TargetAction::PutPercentage(amount),
            other => {
                return Err(CoreError::CorruptSave {
                    offset: tag_at,
                    message: format!("unknown target action tag {other}"),
                })
            }
        };
        out.push(Target::new(
            ComplexId::new(complex),
            action,
            ItemId::new(item),
        ));
    }
    Ok(out)
}

fn decode_flag(value: u8, at: usize, field: &'static str) -> Result<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(CoreError::CorruptSave {
            offset: at,
            message: format!("{field} flag must be 0 or 1, got {other}"),
        }),
    }
}

fn decode_carriage(reader: &ArenaReader, offset: usize) -> Result<Carriage> {
    let mut cursor = Cursor::new(reader, offset);
    let id = cursor.u32("agent id")?;
    let position = Vec3::new(
        cursor.f64("position x")?,
        cursor.f64("position y")?,
        cursor.f64("position z")?,
    );
    let yaw = cursor.f64("yaw")?;
    let pitch = cursor.f64("pitch")?;
    let state_at = cursor.position();
    let state = match cursor.u8("agent state tag")? {
        0 => AgentState::Travelling,
        1 => AgentState::Loading,
        2 => AgentState::Lost,
        other => {
            return Err(CoreError::CorruptSave {
                offset: state_at,
                message: format!("unknown agent state tag {other}"),
            })
        }
    };
    let schedule_count = cursor.u32("schedule count")?;
    let schedule_offset = cursor.u32("schedule offset")?;
    let curr_at = cursor.position();
    let curr_target_i = cursor.u32("current target index")?;
    let items_count = cursor.u32("cargo count")?;
    let items_offset = cursor.u32("cargo offset")?;
    let has_path_at = cursor.position();
    let has_path = decode_flag(cursor.u8("has path")?, has_path_at, "has path")?;
    let waypoints_count = cursor.u32("waypoint count")?;
    let waypoints_offset = cursor.u32("waypoints offset")?;
    let path_progress = cursor.f64("path progress")?;
    let load_timer = cursor.f64("load timer")?;
    let lost_at = cursor.position();
    let lost_reported = decode_flag(cursor.u8("lost reported")?, lost_at, "lost reported")?;
    let params = VehicleParams::new(
        cursor.f64("speed")?,
        cursor.f64("load duration")?,
        cursor.f64("step sound period")?,
    );
    let animals_count = cursor.u32("animal count")?;
    let animals_offset = cursor.u32("animals offset")?;

    if schedule_count > 0 && curr_target_i >= schedule_count {
        return Err(CoreError::CorruptSave {
            offset: curr_at,
            message: format!("target index {curr_target_i} out of range"),
        });
    }

    let schedule = decode_targets(reader, schedule_count, schedule_offset)?;
    let items = decode_store(reader, items_count, items_offset)?;

    let path = if has_path {
        if waypoints_count == 0 {
            return Err(CoreError::CorruptSave {
                offset: has_path_at,
                message: "path must have at least one waypoint".to_string(),
            });
        }
        reader.check_array(waypoints_offset, waypoints_count, WAYPOINT_SIZE, "waypoint")?;
        let mut points = Vec::with_capacity(waypoints_count as usize);
        let mut point_cursor = Cursor::new(reader, waypoints_offset as usize);
        for _ in 0..waypoints_count {
            points.push(Vec3::new(
                point_cursor.f64("waypoint x")?,
                point_cursor.f64("waypoint y")?,
                point_cursor.f64("waypoint z")?,
            ));
        }
        Some(Path::new(points))
    } else {
        None
    };

    reader.check_array(animals_offset, animals_count, 8, "draft animal")?;
    let mut animals = Vec::with_capacity(animals_count as usize);
    let mut animal_cursor = Cursor::new(reader, animals_offset as usize);
    for _ in 0..animals_count {
        animals.push(DraftAnimal::new(animal_cursor.f64("animal offset")?));
    }

    Ok(Carriage {
        agent: Agent {
            id: AgentId::new(id),
            position,
            yaw,
            pitch,
            state,
            params,
            items,
            schedule,
            curr_target_i: curr_target_i as usize,
            path,
            path_progress,
            load_timer,
            lost_reported,
        },
        animals,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const WHEAT: ItemId = ItemId::new(0);
    const FLOUR: ItemId = ItemId::new(1);

    fn milling_complex() -> Complex {
        let mut complex = Complex::new();
        let footprint = TileRect::from_size(TileCoord::new(4, 4), 2, 2);
        let mut conversion = Conversion::new(
            vec![ItemCount::new(2, WHEAT)],
            vec![ItemCount::new(1, FLOUR)],
            10.0,
        );
        conversion.set_elapsed(3.5);
        complex.add_member(
            footprint.min,
            Member::new(footprint).with_conversions(vec![conversion]),
        );
        complex.set_stored(WHEAT, 12);
        complex.set_stored(FLOUR, 2);
        complex
    }

    fn farm_complex() -> Complex {
        let mut complex = Complex::new();
        let field = TileRect::from_size(TileCoord::new(0, 0), 3, 3);
        complex.add_member(
            field.min,
            Member::new(field).with_conversions(vec![Conversion::new(
                vec![],
                vec![ItemCount::new(2, WHEAT)],
                30.0,
            )]),
        );
        let barn = TileRect::from_size(TileCoord::new(3, 0), 2, 2);
        complex.add_member(barn.min, Member::new(barn));
        complex.set_stored(WHEAT, 7);
        complex.set_stored(FLOUR, 1);
        complex
    }

    fn sample_bank() -> ComplexBank {
        let mut bank = ComplexBank::default();
        let farm = bank.create_complex();
        let middle = bank.create_complex();
        let mill = bank.create_complex();
        // The fourth slot stays live with no members
        bank.create_complex();
        *bank.complex_mut(farm) = farm_complex();
        *bank.complex_mut(mill) = milling_complex();
        bank.delete_complex(middle);
        bank
    }

    fn loaded_carriage() -> Carriage {
        let mut carriage = Carriage::new(
            AgentId::new(7),
            Vec3::new(2.5, 0.3, 4.5),
            Carriage::DEFAULT_PARAMS,
        )
        .with_animals(&[1.1, 1.9]);
        carriage.agent.set_schedule(vec![
            Target::new(ComplexId::new(0), TargetAction::LoadFixed(4), WHEAT),
            Target::new(ComplexId::new(2), TargetAction::PutPercentage(0.5), WHEAT),
        ]);
        carriage.agent.set_path(Path::new(vec![
            Vec3::new(2.5, 0.3, 4.5),
            Vec3::new(3.5, 0.1, 4.5),
            Vec3::new(4.5, 0.0, 5.5),
        ]));
        carriage.agent.path_progress = 1.3;
        carriage.agent.yaw = 1.2;
        carriage.agent.items.add(WHEAT, 3);
        carriage
    }

    fn encoded_sample() -> Vec<u8> {
        encode(420, 0xDEAD_BEEF, &sample_bank(), &[loaded_carriage()])
    }

    fn header_u32(bytes: &[u8], at: usize) -> usize {
        u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap()) as usize
    }

    #[test]
    fn test_round_trip_preserves_everything() {
        let bank = sample_bank();
        let carriages = vec![loaded_carriage()];
        let bytes = encode(420, 0xDEAD_BEEF, &bank, &carriages);

        let loaded = decode(&bytes).unwrap();
        assert_eq!(loaded.tick, 420);
        assert_eq!(loaded.rng_state, 0xDEAD_BEEF);
        assert_eq!(loaded.bank, bank);
        assert_eq!(loaded.carriages, carriages);
    }

    #[test]
    fn test_empty_snapshot_round_trips() {
        let bytes = encode(0, 1, &ComplexBank::default(), &[]);
        let loaded = decode(&bytes).unwrap();

        assert_eq!(loaded.bank.slot_count(), 0);
        assert!(loaded.carriages.is_empty());
    }

    #[test]
    fn test_encode_is_deterministic() {
        assert_eq!(encoded_sample(), encoded_sample());
    }

    #[test]
    fn test_free_slot_recycling_survives_round_trip() {
        let bytes = encode(0, 1, &sample_bank(), &[]);
        let mut loaded = decode(&bytes).unwrap();

        assert_eq!(loaded.bank.slot_count(), 4);
        assert_eq!(loaded.bank.live_count(), 3);
        assert_eq!(loaded.bank.create_complex(), ComplexId::new(1));
    }

    #[test]
    fn test_free_slots_are_zeroed_records() {
        let bytes = encode(0, 1, &sample_bank(), &[]);
        let bank_offset = header_u32(&bytes, 24);
        let complexes_offset = header_u32(&bytes, bank_offset + 4);

        let record = &bytes[complexes_offset + COMPLEX_RECORD_SIZE
            ..complexes_offset + 2 * COMPLEX_RECORD_SIZE];
        assert!(record.iter().all(|&byte| byte == 0));
    }

    #[test]
    fn test_carriage_resumes_mid_journey() {
        let carriage = loaded_carriage();
        let bytes = encode(9, 9, &sample_bank(), &[loaded_carriage()]);
        let loaded = decode(&bytes).unwrap();

        let restored = &loaded.carriages[0].agent;
        assert_eq!(restored.path(), carriage.agent.path());
        assert!((restored.path_progress() - 1.3).abs() < 1e-12);
        assert_eq!(restored.current_target_index(), 0);
        assert_eq!(restored.items.count(WHEAT), 3);
        assert_eq!(loaded.carriages[0].animals.len(), 2);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut bytes = encoded_sample();
        bytes[0] = b'X';

        assert!(matches!(
            decode(&bytes),
            Err(CoreError::CorruptSave { offset: 0, .. })
        ));
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let mut bytes = encoded_sample();
        bytes[4..8].copy_from_slice(&99u32.to_le_bytes());

        assert!(matches!(
            decode(&bytes),
            Err(CoreError::UnsupportedSaveVersion {
                found: 99,
                expected: SAVE_VERSION,
            })
        ));
    }

    #[test]
    fn test_truncated_header_rejected() {
        let bytes = encoded_sample();
        assert!(matches!(
            decode(&bytes[..20]),
            Err(CoreError::CorruptSave { .. })
        ));
    }

    #[test]
    fn test_truncated_body_rejected() {
        let bytes = encoded_sample();
        assert!(matches!(
            decode(&bytes[..bytes.len() - 1]),
            Err(CoreError::CorruptSave { .. })
        ));
    }

    #[test]
    fn test_out_of_range_offset_rejected() {
        let mut bytes = encoded_sample();
        bytes[24..28].copy_from_slice(&0xFFFF_0000u32.to_le_bytes());

        assert!(matches!(decode(&bytes), Err(CoreError::CorruptSave { .. })));
    }

    #[test]
    fn test_unknown_state_tag_rejected() {
        let mut bytes = encoded_sample();
        let carriages_offset = header_u32(&bytes, 32);
        // state tag sits after id (4) + position (24) + yaw (8) + pitch (8)
        bytes[carriages_offset + 44] = 9;

        let result = decode(&bytes);
        assert!(matches!(result, Err(CoreError::CorruptSave { .. })));
    }

    #[test]
    fn test_unknown_action_tag_rejected() {
        let mut bytes = encoded_sample();
        let carriages_offset = header_u32(&bytes, 32);
        let schedule_offset = header_u32(&bytes, carriages_offset + 49);
        // the tag follows the complex id in each schedule entry
        bytes[schedule_offset + 4] = 7;

        assert!(matches!(decode(&bytes), Err(CoreError::CorruptSave { .. })));
    }

    #[test]
    fn test_path_flag_without_waypoints_rejected() {
        let mut carriage = loaded_carriage();
        carriage.agent.clear_path();
        let mut bytes = encode(0, 1, &sample_bank(), &[carriage]);
        let carriages_offset = header_u32(&bytes, 32);
        // has_path flag sits after the cargo offset field
        bytes[carriages_offset + 65] = 1;

        assert!(matches!(decode(&bytes), Err(CoreError::CorruptSave { .. })));
    }

    #[test]
    fn test_save_and_load_file() {
        let bytes = encoded_sample();
        let temp_path = std::env::temp_dir().join("homestead_save_test.bin");

        save_to_file(&temp_path, &bytes).unwrap();
        let loaded = load_from_file(&temp_path).unwrap();

        assert_eq!(loaded.tick, 420);
        assert_eq!(loaded.bank.live_count(), 3);
        let _ = std::fs::remove_file(temp_path);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = load_from_file("/nonexistent/homestead.bin");
        assert!(matches!(result, Err(CoreError::Io(_))));
    }

    proptest! {
        /// A flipped byte anywhere in a snapshot either decodes cleanly
        /// or fails with a typed save error; it must never panic or
        /// over-allocate.
        #[test]
        fn prop_corrupted_byte_never_crashes_decode(
            index in any::<prop::sample::Index>(),
            flip in 1u8..,
        ) {
            let mut bytes = encoded_sample();
            let at = index.index(bytes.len());
            bytes[at] ^= flip;

            let result = decode(&bytes);
            prop_assert!(
                matches!(
                    result,
                    Ok(_)
                        | Err(CoreError::CorruptSave { .. })
                        | Err(CoreError::UnsupportedSaveVersion { .. })
                ),
                "decode returned an unexpected variant"
            );
        }

        /// Every strict prefix of a snapshot is rejected: the record
        /// arrays sit at the tail, so any cut removes bytes some offset
        /// still points at.
        #[test]
        fn prop_truncated_snapshot_rejected(index in any::<prop::sample::Index>()) {
            let bytes = encoded_sample();
            let cut = index.index(bytes.len());
            prop_assert!(decode(&bytes[..cut]).is_err());
        }
    }
}
