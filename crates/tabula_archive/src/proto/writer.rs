use core::any::{Any, TypeId};
use core::cell::Cell;
use std::io::Write;

use hashbrown::HashSet;

use tabula_reflect::archive::{ArrayReader, MapReader, OutArchive, OutArchiveRegistry, RefSource};
use tabula_reflect::info::Descriptor;
use tabula_reflect::{Atom, Described, Error, FieldSerializer, Result};

use super::wire::{WireType, put_varint, tag, varint_len, zigzag};

// -----------------------------------------------------------------------------
// Identifier validation

/// Walks every descriptor reachable from `root`, through embedded
/// objects, references, sequence elements and map entries, and rejects
/// the first type with unidentified fields, listing all of them at once.
fn validate_identifiers(root: &'static Descriptor) -> Result<()> {
    let mut visited: HashSet<TypeId> = HashSet::new();
    visited.insert(root.ty_id());
    let mut stack = vec![root];
    while let Some(desc) = stack.pop() {
        let missing = desc.unidentified();
        if !missing.is_empty() {
            return Err(Error::MissingIdentifiers {
                type_name: desc.type_name(),
                fields: missing,
            });
        }
        for field in desc.fields() {
            collect_reachable(field.serializer(), &mut stack, &mut visited);
        }
    }
    Ok(())
}

fn collect_reachable(
    ser: &'static dyn FieldSerializer,
    stack: &mut Vec<&'static Descriptor>,
    visited: &mut HashSet<TypeId>,
) {
    if let Some(desc) = ser.object() {
        if visited.insert(desc.ty_id()) {
            stack.push(desc);
        }
    }
    if let Some(elem) = ser.element() {
        collect_reachable(elem, stack, visited);
    }
    if let Some((key, value)) = ser.entries() {
        collect_reachable(key, stack, visited);
        collect_reachable(value, stack, visited);
    }
}

// -----------------------------------------------------------------------------
// ProtoWriter

/// Serializes a described object graph in the tag/length/value format.
///
/// Output streams directly: every length prefix is computed by the size
/// pass before its payload is emitted, so the stream never needs to seek.
/// Signed integers travel zigzag varint, unsigned ones plain varint,
/// floats as fixed-width little-endian words. References serialize as
/// embedded copies; identity is not preserved across this format, and a
/// null reference is simply omitted from its enclosing field block.
///
/// Every field needs an externally assigned identifier. The whole
/// reachable descriptor graph is checked before the first byte goes out.
///
/// The tag context travels in cells: field positions carry a tag, while
/// sequence elements and other nested payloads are written bare. Size
/// queries share the same context, which keeps them side-effect free on
/// the stream while remaining exact.
pub struct ProtoWriter<W: Write> {
    stream: W,
    ident: Cell<u32>,
    tagged: Cell<bool>,
    failed: bool,
}

impl<W: Write> ProtoWriter<W> {
    pub fn new(stream: W) -> Self {
        Self {
            stream,
            ident: Cell::new(0),
            tagged: Cell::new(false),
            failed: false,
        }
    }

    /// Serializes one root object. Roots are written bare, with no outer
    /// length, so several may share a stream if the reader knows the
    /// boundaries.
    pub fn write_root<T: Described>(&mut self, obj: &T) -> Result<()> {
        if self.failed {
            return Err(Error::Poisoned);
        }
        match self.write_root_inner(obj) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.failed = true;
                Err(err)
            }
        }
    }

    fn write_root_inner<T: Described>(&mut self, obj: &T) -> Result<()> {
        let desc = T::descriptor();
        validate_identifiers(desc)?;
        self.write_fields(desc, obj)
    }

    pub fn finish(mut self) -> Result<W> {
        if self.failed {
            return Err(Error::Poisoned);
        }
        self.stream.flush()?;
        Ok(self.stream)
    }

    // ---- tag context ----

    #[inline]
    fn context(&self) -> (u32, bool) {
        (self.ident.get(), self.tagged.get())
    }

    #[inline]
    fn set_context(&self, saved: (u32, bool)) {
        self.ident.set(saved.0);
        self.tagged.set(saved.1);
    }

    /// Cost of the tag a value at the current position carries, zero in
    /// bare positions.
    #[inline]
    fn tag_cost(&self, wire: WireType) -> u64 {
        if self.tagged.get() {
            varint_len(tag(self.ident.get(), wire))
        } else {
            0
        }
    }

    // ---- emission ----

    fn put(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream.write_all(bytes)?;
        Ok(())
    }

    fn emit_varint(&mut self, v: u64) -> Result<()> {
        let mut buf = Vec::with_capacity(10);
        put_varint(&mut buf, v);
        self.put(&buf)
    }

    fn emit_tag(&mut self, wire: WireType) -> Result<()> {
        if self.tagged.get() {
            self.emit_varint(tag(self.ident.get(), wire))
        } else {
            Ok(())
        }
    }

    // ---- field blocks ----

    /// Byte cost of a descriptor's fields as a tagged block, excluding any
    /// outer tag or length.
    fn fields_size(&self, desc: &'static Descriptor, obj: &dyn Any) -> Result<u64> {
        let saved = self.context();
        let mut total = 0;
        for field in desc.fields() {
            self.ident.set(self.field_ident(desc, field.ident())?);
            self.tagged.set(true);
            total += field.serializer().size(self, field.get(obj)?)?;
        }
        self.set_context(saved);
        Ok(total)
    }

    fn write_fields(&mut self, desc: &'static Descriptor, obj: &dyn Any) -> Result<()> {
        let saved = self.context();
        for field in desc.fields() {
            self.ident.set(self.field_ident(desc, field.ident())?);
            self.tagged.set(true);
            field.serializer().serialize(self, field.get(obj)?)?;
        }
        self.set_context(saved);
        Ok(())
    }

    // Root validation normally guarantees this; the fallback covers
    // descriptors reached without passing through `write_root`.
    fn field_ident(&self, desc: &'static Descriptor, ident: Option<u32>) -> Result<u32> {
        ident.ok_or_else(|| Error::MissingIdentifiers {
            type_name: desc.type_name(),
            fields: desc.unidentified(),
        })
    }

    /// Byte cost of one map entry body: tagged key and value under the
    /// reserved identifiers 1 and 2.
    fn map_entry_size(&self, map: &dyn MapReader, i: usize) -> Result<u64> {
        let saved = self.context();
        self.tagged.set(true);
        self.ident.set(1);
        let key = map.key_serializer().size(self, map.key(i))?;
        self.ident.set(2);
        let value = map.value_serializer().size(self, map.value(i))?;
        self.set_context(saved);
        Ok(key + value)
    }
}

// -----------------------------------------------------------------------------
// Archive protocol

impl<W: Write> OutArchive for ProtoWriter<W> {
    fn size_integer(&self, value: i64, atom: Atom) -> u64 {
        let payload = if atom.is_signed() {
            zigzag(value)
        } else {
            value as u64
        };
        self.tag_cost(WireType::Varint) + varint_len(payload)
    }

    fn size_float32(&self, _value: f32) -> u64 {
        self.tag_cost(WireType::DoubleWord) + 4
    }

    fn size_float64(&self, _value: f64) -> u64 {
        self.tag_cost(WireType::QuadWord) + 8
    }

    fn size_bool(&self, _value: bool) -> u64 {
        self.tag_cost(WireType::Varint) + 1
    }

    fn size_string(&self, bytes: &[u8], _char_count: u64, _char_size: u8) -> u64 {
        let n = bytes.len() as u64;
        self.tag_cost(WireType::LenDelimit) + varint_len(n) + n
    }

    fn write_integer(&mut self, value: i64, atom: Atom) -> Result<()> {
        let payload = if atom.is_signed() {
            zigzag(value)
        } else {
            value as u64
        };
        self.emit_tag(WireType::Varint)?;
        self.emit_varint(payload)
    }

    fn write_float32(&mut self, value: f32) -> Result<()> {
        self.emit_tag(WireType::DoubleWord)?;
        self.put(&value.to_le_bytes())
    }

    fn write_float64(&mut self, value: f64) -> Result<()> {
        self.emit_tag(WireType::QuadWord)?;
        self.put(&value.to_le_bytes())
    }

    fn write_bool(&mut self, value: bool) -> Result<()> {
        self.emit_tag(WireType::Varint)?;
        self.emit_varint(u64::from(value))
    }

    fn write_byte_array(&mut self, bytes: &[u8], write_size: bool) -> Result<()> {
        if write_size {
            self.emit_varint(bytes.len() as u64)?;
        }
        self.put(bytes)
    }

    fn write_string(&mut self, bytes: &[u8], _char_count: u64, _char_size: u8) -> Result<()> {
        self.emit_tag(WireType::LenDelimit)?;
        self.emit_varint(bytes.len() as u64)?;
        self.put(bytes)
    }
}

impl<W: Write> OutArchiveRegistry for ProtoWriter<W> {
    fn size_object(&self, desc: &'static Descriptor, obj: &dyn Any) -> Result<u64> {
        let body = self.fields_size(desc, obj)?;
        Ok(self.tag_cost(WireType::LenDelimit) + varint_len(body) + body)
    }

    fn size_array(&self, ary: &dyn ArrayReader) -> Result<u64> {
        let saved = self.context();
        self.tagged.set(false);
        let elem = ary.element();
        let mut body = varint_len(ary.len() as u64);
        for i in 0..ary.len() {
            body += elem.size(self, ary.get(i))?;
        }
        self.set_context(saved);
        Ok(self.tag_cost(WireType::LenDelimit) + varint_len(body) + body)
    }

    fn size_map(&self, map: &dyn MapReader) -> Result<u64> {
        if self.tagged.get() {
            // One tagged entry per pair.
            let mut total = 0;
            for i in 0..map.len() {
                let entry = self.map_entry_size(map, i)?;
                total += self.tag_cost(WireType::LenDelimit) + varint_len(entry) + entry;
            }
            Ok(total)
        } else {
            let mut body = 0;
            for i in 0..map.len() {
                body += self.map_entry_size(map, i)?;
            }
            Ok(varint_len(body) + body)
        }
    }

    fn size_reference(
        &self,
        desc: &'static Descriptor,
        source: Option<RefSource<'_>>,
    ) -> Result<u64> {
        match source {
            // A null reference is omitted in a tagged position; bare
            // positions need an explicit zero length.
            None => Ok(if self.tagged.get() { 0 } else { 1 }),
            Some(src) => {
                let body = self.fields_size(desc, src.obj)?;
                Ok(self.tag_cost(WireType::LenDelimit) + varint_len(body) + body)
            }
        }
    }

    fn write_object(&mut self, desc: &'static Descriptor, obj: &dyn Any) -> Result<()> {
        let body = self.fields_size(desc, obj)?;
        self.emit_tag(WireType::LenDelimit)?;
        self.emit_varint(body)?;
        self.write_fields(desc, obj)
    }

    fn write_array(&mut self, ary: &dyn ArrayReader) -> Result<()> {
        let saved = self.context();
        self.tagged.set(false);
        let elem = ary.element();
        let mut body = varint_len(ary.len() as u64);
        for i in 0..ary.len() {
            body += elem.size(self, ary.get(i))?;
        }
        self.set_context(saved);

        self.emit_tag(WireType::LenDelimit)?;
        self.emit_varint(body)?;

        self.tagged.set(false);
        self.emit_varint(ary.len() as u64)?;
        let mut outcome = Ok(());
        for i in 0..ary.len() {
            outcome = elem.serialize(self, ary.get(i));
            if outcome.is_err() {
                break;
            }
        }
        self.set_context(saved);
        outcome
    }

    fn write_map(&mut self, map: &dyn MapReader) -> Result<()> {
        let saved = self.context();
        let key_ser = map.key_serializer();
        let value_ser = map.value_serializer();

        if !self.tagged.get() {
            let mut body = 0;
            for i in 0..map.len() {
                body += self.map_entry_size(map, i)?;
            }
            self.emit_varint(body)?;
        }

        let mut outcome = Ok(());
        for i in 0..map.len() {
            if saved.1 {
                let entry = self.map_entry_size(map, i)?;
                self.set_context(saved);
                self.emit_tag(WireType::LenDelimit)?;
                self.emit_varint(entry)?;
            }
            self.tagged.set(true);
            self.ident.set(1);
            outcome = key_ser.serialize(self, map.key(i));
            if outcome.is_err() {
                break;
            }
            self.ident.set(2);
            outcome = value_ser.serialize(self, map.value(i));
            if outcome.is_err() {
                break;
            }
        }
        self.set_context(saved);
        outcome
    }

    fn write_reference(
        &mut self,
        desc: &'static Descriptor,
        source: Option<RefSource<'_>>,
    ) -> Result<()> {
        match source {
            None => {
                if !self.tagged.get() {
                    self.emit_varint(0)?;
                }
                Ok(())
            }
            Some(src) => {
                let body = self.fields_size(desc, src.obj)?;
                self.emit_tag(WireType::LenDelimit)?;
                self.emit_varint(body)?;
                self.write_fields(desc, src.obj)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabula_reflect::describe;

    #[derive(Default)]
    struct Point {
        x: i32,
        y: u32,
    }

    describe! {
        Point {
            x => 1,
            y => 2,
        }
    }

    #[test]
    fn tagged_scalars_on_the_wire() {
        let mut w = ProtoWriter::new(Vec::new());
        w.write_root(&Point { x: -1, y: 300 }).unwrap();
        let bytes = w.finish().unwrap();
        // tag(1, varint), zigzag(-1); tag(2, varint), varint(300).
        assert_eq!(bytes, [0x08, 0x01, 0x10, 0xAC, 0x02]);
    }

    #[test]
    fn missing_identifiers_are_enumerated_up_front() {
        #[derive(Default)]
        struct Untagged {
            a: i32,
            b: String,
            c: bool,
        }

        describe! {
            Untagged {
                a,
                b,
                c,
            }
        }

        let mut w = ProtoWriter::new(Vec::new());
        let err = w.write_root(&Untagged::default()).unwrap_err();
        match err {
            Error::MissingIdentifiers { type_name, fields } => {
                assert_eq!(type_name, "Untagged");
                assert_eq!(fields.len(), 3);
                assert_eq!(fields[0].0, Atom::I32);
                assert_eq!(fields[1].0, Atom::String);
                assert_eq!(fields[2].0, Atom::Bool);
            }
            other => panic!("unexpected error: {other}"),
        }
        // Nothing was emitted before the failure.
        assert!(matches!(w.finish(), Err(Error::Poisoned)));
    }

    #[test]
    fn validation_reaches_nested_descriptors() {
        #[derive(Default)]
        struct Bare {
            v: u8,
        }

        describe! {
            Bare {
                v,
            }
        }

        #[derive(Default)]
        struct Outer {
            inner: Option<Box<Bare>>,
        }

        describe! {
            Outer {
                inner => 1,
            }
        }

        let mut w = ProtoWriter::new(Vec::new());
        let err = w.write_root(&Outer::default()).unwrap_err();
        assert!(matches!(
            err,
            Error::MissingIdentifiers {
                type_name: "Bare",
                ..
            }
        ));
    }

    #[test]
    fn null_reference_is_omitted() {
        #[derive(Default)]
        struct Link {
            next: Option<Box<Point>>,
            label: u8,
        }

        describe! {
            Link {
                next => 1,
                label => 2,
            }
        }

        let mut w = ProtoWriter::new(Vec::new());
        w.write_root(&Link {
            next: None,
            label: 9,
        })
        .unwrap();
        let bytes = w.finish().unwrap();
        // Only the label field appears.
        assert_eq!(bytes, [0x10, 9]);
    }
}
