//! Page counting and single-page extraction for PDF and multi-frame TIFF.

use std::collections::BTreeSet;
use std::io::{Cursor, Seek, Write};

use anyhow::{Context, Result, anyhow, bail};
use lopdf::{Dictionary, Document, Object, ObjectId, dictionary};
use tiff::decoder::Decoder;
use tiff::decoder::ifd::Value;
use tiff::encoder::{DirectoryEncoder, Rational, TiffEncoder, TiffKind};
use tiff::tags::Tag;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageFormat {
    Pdf,
    Tiff,
}

impl PageFormat {
    /// Format for a lower-cased, dot-prefixed extension.
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension {
            ".pdf" => Some(Self::Pdf),
            ".tif" | ".tiff" => Some(Self::Tiff),
            _ => None,
        }
    }
}

pub fn load_pdf(bytes: &[u8]) -> Result<Document> {
    let document = Document::load_mem(bytes).context("failed to parse PDF")?;
    if document.is_encrypted() {
        bail!("encrypted PDFs are not supported");
    }
    Ok(document)
}

pub fn count_pdf_pages(bytes: &[u8]) -> Result<u32> {
    let document = load_pdf(bytes)?;
    Ok(document.get_pages().len() as u32)
}

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITED_PAGE_KEYS: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Serializes a one-page document holding `page_number` (1-based) and only
/// the objects reachable from it.
pub fn extract_pdf_page(document: &Document, page_number: u32) -> Result<Vec<u8>> {
    let page_id = *document
        .get_pages()
        .get(&page_number)
        .ok_or_else(|| anyhow!("PDF has no page {page_number}"))?;
    let mut page = document
        .get_dictionary(page_id)
        .with_context(|| format!("PDF page {page_number} is not a dictionary"))?
        .clone();
    inherit_page_attributes(document, &mut page);
    page.remove(b"Parent");

    let mut kept = BTreeSet::from([page_id]);
    let mut pending = Vec::new();
    for (_, value) in page.iter() {
        push_references(value, &mut pending);
    }
    while let Some(id) = pending.pop() {
        if kept.contains(&id) {
            continue;
        }
        let Ok(object) = document.get_object(id) else {
            continue;
        };
        if is_page_tree_node(object) {
            continue;
        }
        kept.insert(id);
        push_references(object, &mut pending);
    }

    let mut single = Document::with_version(document.version.clone());
    single.max_id = document.max_id;
    for &id in &kept {
        let mut object = if id == page_id {
            Object::Dictionary(page.clone())
        } else {
            document
                .get_object(id)
                .with_context(|| format!("PDF object {} {} is missing", id.0, id.1))?
                .clone()
        };
        drop_foreign_references(&mut object, &kept);
        single.objects.insert(id, object);
    }

    let pages_id = single.add_object(dictionary! {
        "Type" => "Pages",
        "Kids" => vec![Object::Reference(page_id)],
        "Count" => 1_i64,
    });
    page.set("Parent", pages_id);
    single.objects.insert(page_id, Object::Dictionary(page));
    let catalog_id = single.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    single.trailer.set("Root", catalog_id);
    single.renumber_objects();

    let mut bytes = Vec::new();
    single
        .save_to(&mut bytes)
        .with_context(|| format!("failed to serialize PDF page {page_number}"))?;
    Ok(bytes)
}

fn inherit_page_attributes(document: &Document, page: &mut Dictionary) {
    let mut visited = BTreeSet::new();
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    while let Some(node_id) = parent {
        if !visited.insert(node_id) {
            break;
        }
        let Ok(node) = document.get_dictionary(node_id) else {
            break;
        };
        for key in INHERITED_PAGE_KEYS {
            if page.has(key) {
                continue;
            }
            if let Ok(value) = node.get(key) {
                page.set(key.to_vec(), value.clone());
            }
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }
}

fn is_page_tree_node(object: &Object) -> bool {
    object
        .as_dict()
        .map(|dict| dict.has_type(b"Page") || dict.has_type(b"Pages"))
        .unwrap_or(false)
}

/// Queues every reference in `object`, skipping `Parent` links so the walk
/// never climbs back into the page tree.
fn push_references(object: &Object, pending: &mut Vec<ObjectId>) {
    match object {
        Object::Reference(id) => pending.push(*id),
        Object::Array(items) => items.iter().for_each(|item| push_references(item, pending)),
        Object::Dictionary(dict) => push_dictionary_references(dict, pending),
        Object::Stream(stream) => push_dictionary_references(&stream.dict, pending),
        _ => {}
    }
}

fn push_dictionary_references(dict: &Dictionary, pending: &mut Vec<ObjectId>) {
    for (key, value) in dict.iter() {
        if key.as_slice() != b"Parent" {
            push_references(value, pending);
        }
    }
}

/// Nulls references to objects left out of the extracted page.
fn drop_foreign_references(object: &mut Object, kept: &BTreeSet<ObjectId>) {
    match object {
        Object::Reference(id) => {
            let id = *id;
            if !kept.contains(&id) {
                *object = Object::Null;
            }
        }
        Object::Array(items) => items
            .iter_mut()
            .for_each(|item| drop_foreign_references(item, kept)),
        Object::Dictionary(dict) => dict
            .iter_mut()
            .for_each(|(_, value)| drop_foreign_references(value, kept)),
        Object::Stream(stream) => stream
            .dict
            .iter_mut()
            .for_each(|(_, value)| drop_foreign_references(value, kept)),
        _ => {}
    }
}

/// Number of image directories (frames) in a TIFF; at least one for any
/// readable file.
pub fn count_tiff_frames(bytes: &[u8]) -> Result<u32> {
    let mut decoder = Decoder::new(Cursor::new(bytes)).context("failed to parse TIFF")?;
    let mut frames = 1;
    while decoder.more_images() {
        decoder
            .next_image()
            .with_context(|| format!("failed to read TIFF frame {}", frames + 1))?;
        frames += 1;
    }
    Ok(frames)
}

/// Code of the CCITT Group 3 options tag, which the tag table leaves unnamed.
const T4_OPTIONS: u16 = 292;
/// Code of the CCITT Group 4 options tag.
const T6_OPTIONS: u16 = 293;

#[derive(Debug, Clone, Copy)]
enum FieldWidth {
    Byte,
    Short,
    Long,
}

/// Tags carried from the source frame into an extracted frame. Strip and
/// tile locations are rebuilt separately.
const CARRIED_TAGS: [(Tag, FieldWidth); 20] = [
    (Tag::ImageWidth, FieldWidth::Long),
    (Tag::ImageLength, FieldWidth::Long),
    (Tag::BitsPerSample, FieldWidth::Short),
    (Tag::Compression, FieldWidth::Short),
    (Tag::PhotometricInterpretation, FieldWidth::Short),
    (Tag::FillOrder, FieldWidth::Short),
    (Tag::Orientation, FieldWidth::Short),
    (Tag::SamplesPerPixel, FieldWidth::Short),
    (Tag::RowsPerStrip, FieldWidth::Long),
    (Tag::PlanarConfiguration, FieldWidth::Short),
    (Tag::ResolutionUnit, FieldWidth::Short),
    (Tag::Predictor, FieldWidth::Short),
    (Tag::ColorMap, FieldWidth::Short),
    (Tag::ExtraSamples, FieldWidth::Short),
    (Tag::SampleFormat, FieldWidth::Short),
    (Tag::TileWidth, FieldWidth::Long),
    (Tag::TileLength, FieldWidth::Long),
    (Tag::Unknown(T4_OPTIONS), FieldWidth::Long),
    (Tag::Unknown(T6_OPTIONS), FieldWidth::Long),
    (Tag::JPEGTables, FieldWidth::Byte),
];

/// Copies frame `frame_index` (0-based) into a standalone single-frame TIFF.
/// The compressed strips or tiles are copied as stored, so any bit depth and
/// compression scheme survives without decoding.
pub fn extract_tiff_frame(bytes: &[u8], frame_index: u32) -> Result<Vec<u8>> {
    let mut decoder = Decoder::new(Cursor::new(bytes)).context("failed to parse TIFF")?;
    for _ in 0..frame_index {
        decoder
            .next_image()
            .with_context(|| format!("failed to seek to TIFF frame {frame_index}"))?;
    }

    let (offsets_tag, counts_tag) = if decoder.find_tag(Tag::TileOffsets)?.is_some() {
        (Tag::TileOffsets, Tag::TileByteCounts)
    } else {
        (Tag::StripOffsets, Tag::StripByteCounts)
    };
    let offsets = unsigned_values(decoder.get_tag(offsets_tag)?)
        .with_context(|| format!("bad {offsets_tag:?} in TIFF frame {frame_index}"))?;
    let counts = unsigned_values(decoder.get_tag(counts_tag)?)
        .with_context(|| format!("bad {counts_tag:?} in TIFF frame {frame_index}"))?;
    if offsets.len() != counts.len() {
        bail!(
            "TIFF frame {frame_index} lists {} data offsets but {} byte counts",
            offsets.len(),
            counts.len()
        );
    }

    let mut out = Cursor::new(Vec::new());
    {
        let mut encoder = TiffEncoder::new(&mut out)?;
        let mut directory = encoder.new_directory()?;

        let mut new_offsets = Vec::with_capacity(offsets.len());
        let mut new_counts = Vec::with_capacity(counts.len());
        for (&offset, &count) in offsets.iter().zip(&counts) {
            let chunk = usize::try_from(offset)
                .ok()
                .zip(usize::try_from(count).ok())
                .and_then(|(start, len)| bytes.get(start..start.checked_add(len)?))
                .with_context(|| {
                    format!("TIFF frame {frame_index} data at {offset}+{count} is out of bounds")
                })?;
            new_offsets.push(u32::try_from(directory.write_data(chunk)?)?);
            new_counts.push(u32::try_from(count)?);
        }

        for (tag, width) in CARRIED_TAGS {
            if let Some(value) = decoder.find_tag(tag)? {
                let values = unsigned_values(value)
                    .with_context(|| format!("bad {tag:?} in TIFF frame {frame_index}"))?;
                write_unsigned(&mut directory, tag, width, &values)?;
            }
        }
        for tag in [Tag::XResolution, Tag::YResolution] {
            if let Some(Value::Rational(n, d)) = decoder.find_tag(tag)? {
                directory.write_tag(tag, Rational { n, d })?;
            }
        }
        directory.write_tag(offsets_tag, &new_offsets[..])?;
        directory.write_tag(counts_tag, &new_counts[..])?;
        directory.finish()?;
    }

    Ok(out.into_inner())
}

fn unsigned_values(value: Value) -> Result<Vec<u64>> {
    match value {
        Value::List(items) => items.into_iter().map(unsigned_value).collect(),
        other => Ok(vec![unsigned_value(other)?]),
    }
}

fn unsigned_value(value: Value) -> Result<u64> {
    match value {
        Value::Byte(byte) => Ok(u64::from(byte)),
        other => other.into_u64().context("expected an unsigned TIFF value"),
    }
}

fn write_unsigned<W: Write + Seek, K: TiffKind>(
    directory: &mut DirectoryEncoder<'_, W, K>,
    tag: Tag,
    width: FieldWidth,
    values: &[u64],
) -> Result<()> {
    match width {
        FieldWidth::Byte => {
            let values = narrow::<u8>(tag, values)?;
            directory.write_tag(tag, &values[..])?;
        }
        FieldWidth::Short => {
            let values = narrow::<u16>(tag, values)?;
            directory.write_tag(tag, &values[..])?;
        }
        FieldWidth::Long => {
            let values = narrow::<u32>(tag, values)?;
            directory.write_tag(tag, &values[..])?;
        }
    }
    Ok(())
}

fn narrow<T: TryFrom<u64>>(tag: Tag, values: &[u64]) -> Result<Vec<T>> {
    values
        .iter()
        .map(|&value| {
            T::try_from(value)
                .map_err(|_| anyhow!("TIFF tag {tag:?} value {value} does not fit its field"))
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::io::Cursor;

    use lopdf::{Document, Object, Stream, dictionary};
    use tiff::encoder::{Rational, TiffEncoder, colortype};
    use tiff::tags::Tag;

    /// Minimal PDF with `page_count` A4 pages. Page `n` draws the text
    /// `(page n)`; media box and font resources live on the page tree root.
    pub fn pdf_with_pages(page_count: u32) -> Vec<u8> {
        let mut document = Document::with_version("1.5");
        let pages_id = document.new_object_id();
        let font_id = document.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });

        let mut kids: Vec<Object> = Vec::new();
        for number in 1..=page_count {
            let text = format!("BT /F1 12 Tf 72 720 Td (page {number}) Tj ET");
            let content_id = document.add_object(Stream::new(dictionary! {}, text.into_bytes()));
            let page_id = document.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        document.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => page_count as i64,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
                "Resources" => dictionary! {
                    "Font" => dictionary! { "F1" => font_id },
                },
            }),
        );
        let catalog_id = document.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        document.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        document.save_to(&mut bytes).expect("fixture PDF serializes");
        bytes
    }

    /// 4x4 grayscale TIFF with `frame_count` frames.
    pub fn tiff_with_frames(frame_count: u32) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        {
            let mut encoder = TiffEncoder::new(&mut out).expect("tiff encoder");
            for frame in 0..frame_count {
                let pixels = vec![(frame * 40) as u8; 16];
                encoder
                    .write_image::<colortype::Gray8>(4, 4, &pixels)
                    .expect("fixture frame encodes");
            }
        }
        out.into_inner()
    }

    /// Uncompressed 8x2 bi-level TIFF with one frame per entry of `frames`;
    /// each entry holds the two packed rows of its frame.
    pub fn bilevel_tiff(frames: &[[u8; 2]]) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        {
            let mut encoder = TiffEncoder::new(&mut out).expect("tiff encoder");
            for rows in frames {
                let mut directory = encoder.new_directory().expect("directory");
                let offset = directory.write_data(&rows[..]).expect("strip data") as u32;
                directory.write_tag(Tag::ImageWidth, 8u32).expect("width");
                directory.write_tag(Tag::ImageLength, 2u32).expect("length");
                directory.write_tag(Tag::BitsPerSample, 1u16).expect("bits");
                directory.write_tag(Tag::Compression, 1u16).expect("compression");
                directory
                    .write_tag(Tag::PhotometricInterpretation, 0u16)
                    .expect("photometric");
                directory.write_tag(Tag::SamplesPerPixel, 1u16).expect("samples");
                directory.write_tag(Tag::RowsPerStrip, 2u32).expect("rows per strip");
                directory.write_tag(Tag::StripOffsets, offset).expect("offsets");
                directory.write_tag(Tag::StripByteCounts, 2u32).expect("byte counts");
                directory
                    .write_tag(Tag::XResolution, Rational { n: 200, d: 1 })
                    .expect("x resolution");
                directory.finish().expect("directory finishes");
            }
        }
        out.into_inner()
    }
}
