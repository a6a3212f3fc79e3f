//! Content-stream inspection with lopdf
//!
//! Walks a page's content stream tracking the current transformation matrix
//! to find where image XObjects are painted and how many pixels they carry.
//! Form XObjects are followed (bounded depth) and reported as drawables.

use std::collections::HashSet;
use std::io::Cursor;

use log::{debug, warn};
use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use super::error::BackendError;
use super::types::{EmbeddedImage, RawImage, RawImageFormat, Rect};

/// Nesting limit for form XObjects
const MAX_FORM_DEPTH: usize = 8;

/// Images and drawables found on one page
#[derive(Debug, Default)]
pub struct PageStructure {
    pub images: Vec<EmbeddedImage>,
    /// Bounding boxes of painted form XObjects
    pub drawables: Vec<Rect>,
    /// Image objects in first-use order
    pub image_ids: Vec<ObjectId>,
}

/// PDF affine matrix `[a b c d e f]`
#[derive(Clone, Copy, Debug, PartialEq)]
struct Matrix([f32; 6]);

impl Matrix {
    const IDENTITY: Matrix = Matrix([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    /// `self` applied first, then `other`
    fn then(self, other: Matrix) -> Matrix {
        let [a1, b1, c1, d1, e1, f1] = self.0;
        let [a2, b2, c2, d2, e2, f2] = other.0;
        Matrix([
            a1 * a2 + b1 * c2,
            a1 * b2 + b1 * d2,
            c1 * a2 + d1 * c2,
            c1 * b2 + d1 * d2,
            e1 * a2 + f1 * c2 + e2,
            e1 * b2 + f1 * d2 + f2,
        ])
    }

    fn apply(self, x: f32, y: f32) -> (f32, f32) {
        let [a, b, c, d, e, f] = self.0;
        (a * x + c * y + e, b * x + d * y + f)
    }

    fn from_operands(operands: &[Object]) -> Option<Matrix> {
        if operands.len() != 6 {
            return None;
        }
        let mut m = [0.0; 6];
        for (slot, obj) in m.iter_mut().zip(operands) {
            *slot = object_to_f32(obj)?;
        }
        Some(Matrix(m))
    }

    /// Bounding box of `(x0, y0)-(x1, y1)` after transformation
    fn transform_box(self, x0: f32, y0: f32, x1: f32, y1: f32) -> (f32, f32, f32, f32) {
        let corners = [
            self.apply(x0, y0),
            self.apply(x1, y0),
            self.apply(x0, y1),
            self.apply(x1, y1),
        ];
        corners.iter().fold(
            (f32::MAX, f32::MAX, f32::MIN, f32::MIN),
            |(min_x, min_y, max_x, max_y), (x, y)| {
                (min_x.min(*x), min_y.min(*y), max_x.max(*x), max_y.max(*y))
            },
        )
    }
}

/// Maps PDF user space (origin bottom-left) onto page-space (origin top-left)
#[derive(Clone, Copy, Debug)]
pub struct PageFrame {
    pub x0: f32,
    pub top: f32,
}

impl PageFrame {
    /// Frame of the page's CropBox, or MediaBox when there is none
    pub fn of_page(doc: &Document, page_id: ObjectId) -> Result<Self, BackendError> {
        let page_box = resolve_inherited(doc, page_id, b"CropBox")?
            .or(resolve_inherited(doc, page_id, b"MediaBox")?)
            .and_then(|obj| resolve(doc, obj).as_array().ok())
            .and_then(|arr| box_from_array(arr));
        let (x0, _, _, y1) = page_box.unwrap_or((0.0, 0.0, 612.0, 792.0));
        Ok(Self { x0, top: y1 })
    }

    fn to_page_rect(self, (x0, y0, x1, y1): (f32, f32, f32, f32)) -> Rect {
        Rect::new(x0 - self.x0, self.top - y1, x1 - self.x0, self.top - y0)
    }
}

/// Walk the page content and collect image placements and drawables
pub fn inspect_page(doc: &Document, page_id: ObjectId) -> Result<PageStructure, BackendError> {
    let frame = PageFrame::of_page(doc, page_id)?;
    let resources = page_resources(doc, page_id)?;
    let content = doc.get_page_content(page_id)?;
    let operations = Content::decode(&content)?.operations;

    let mut walker = Walker {
        doc,
        frame,
        out: PageStructure::default(),
        seen: HashSet::new(),
    };
    walker.run(&operations, resources, Matrix::IDENTITY, 0);
    debug!(
        "page {page_id:?}: {} image placements, {} drawables",
        walker.out.images.len(),
        walker.out.drawables.len()
    );
    Ok(walker.out)
}

struct Walker<'a> {
    doc: &'a Document,
    frame: PageFrame,
    out: PageStructure,
    seen: HashSet<ObjectId>,
}

impl<'a> Walker<'a> {
    fn run(
        &mut self,
        operations: &[lopdf::content::Operation],
        resources: Option<&'a Dictionary>,
        base: Matrix,
        depth: usize,
    ) {
        let mut ctm = base;
        let mut stack = Vec::new();

        for op in operations {
            match op.operator.as_str() {
                "q" => stack.push(ctm),
                "Q" => ctm = stack.pop().unwrap_or(base),
                "cm" => {
                    if let Some(m) = Matrix::from_operands(&op.operands) {
                        ctm = m.then(ctm);
                    }
                }
                "Do" => {
                    let Some(name) = op.operands.first().and_then(|o| o.as_name().ok()) else {
                        continue;
                    };
                    self.paint_xobject(name, resources, ctm, depth);
                }
                _ => {}
            }
        }
    }

    fn paint_xobject(
        &mut self,
        name: &[u8],
        resources: Option<&'a Dictionary>,
        ctm: Matrix,
        depth: usize,
    ) {
        let Some((id, stream)) = lookup_xobject(self.doc, resources, name) else {
            debug!("XObject /{} not found", String::from_utf8_lossy(name));
            return;
        };

        match subtype(&stream.dict) {
            Some(b"Image") => {
                let width = dict_u32(&stream.dict, b"Width");
                let height = dict_u32(&stream.dict, b"Height");
                let placement = self.frame.to_page_rect(ctm.transform_box(0.0, 0.0, 1.0, 1.0));
                if let (Some(pixel_width), Some(pixel_height)) = (width, height) {
                    self.out.images.push(EmbeddedImage {
                        pixel_width,
                        pixel_height,
                        placement,
                    });
                }
                if self.seen.insert(id) {
                    self.out.image_ids.push(id);
                }
            }
            Some(b"Form") => {
                let form_matrix = stream
                    .dict
                    .get(b"Matrix")
                    .ok()
                    .and_then(|o| resolve(self.doc, o).as_array().ok())
                    .and_then(|arr| Matrix::from_operands(arr))
                    .unwrap_or(Matrix::IDENTITY);
                let form_ctm = form_matrix.then(ctm);

                if let Some(bbox) = stream
                    .dict
                    .get(b"BBox")
                    .ok()
                    .and_then(|o| resolve(self.doc, o).as_array().ok())
                    .and_then(|arr| box_from_array(arr))
                {
                    let (x0, y0, x1, y1) = bbox;
                    self.out
                        .drawables
                        .push(self.frame.to_page_rect(form_ctm.transform_box(x0, y0, x1, y1)));
                }

                if depth >= MAX_FORM_DEPTH {
                    warn!("form XObject nesting deeper than {MAX_FORM_DEPTH}, not descending");
                    return;
                }
                let form_resources = stream
                    .dict
                    .get(b"Resources")
                    .ok()
                    .and_then(|o| resolve(self.doc, o).as_dict().ok())
                    .or(resources);
                match stream_bytes(stream).and_then(|bytes| Content::decode(&bytes).ok()) {
                    Some(content) => {
                        self.run(&content.operations, form_resources, form_ctm, depth + 1);
                    }
                    None => debug!("form XObject {id:?} content unreadable"),
                }
            }
            _ => {}
        }
    }
}

/// Encode the page's image objects for writing to disk. Objects in
/// encodings that cannot be written verbatim or re-encoded are skipped.
pub fn raw_images(doc: &Document, page_id: ObjectId) -> Result<Vec<RawImage>, BackendError> {
    let structure = inspect_page(doc, page_id)?;
    let mut images = Vec::new();

    for id in structure.image_ids {
        let Ok(stream) = doc.get_object(id).and_then(Object::as_stream) else {
            continue;
        };
        match encode_image(doc, stream) {
            Some(image) => images.push(image),
            None => warn!("Skipping image object {id:?}: unsupported encoding"),
        }
    }
    Ok(images)
}

fn encode_image(doc: &Document, stream: &Stream) -> Option<RawImage> {
    let filters = filter_names(doc, &stream.dict);

    match filters.last().map(String::as_str) {
        Some("DCTDecode") if filters.len() == 1 => {
            return Some(RawImage {
                data: stream.content.clone(),
                format: RawImageFormat::Jpeg,
            });
        }
        Some("JPXDecode") if filters.len() == 1 => {
            return Some(RawImage {
                data: stream.content.clone(),
                format: RawImageFormat::Jpeg2000,
            });
        }
        Some("DCTDecode" | "JPXDecode" | "JBIG2Decode" | "CCITTFaxDecode") => return None,
        _ => {}
    }

    if dict_u32(&stream.dict, b"BitsPerComponent") != Some(8) {
        return None;
    }
    let width = dict_u32(&stream.dict, b"Width")?;
    let height = dict_u32(&stream.dict, b"Height")?;
    let components = color_components(doc, &stream.dict)?;
    let samples = stream_bytes(stream)?;
    let pixels = width as usize * height as usize;
    if samples.len() < pixels * components {
        return None;
    }

    let image = match components {
        1 => image::DynamicImage::ImageLuma8(image::GrayImage::from_raw(
            width,
            height,
            samples[..pixels].to_vec(),
        )?),
        3 => image::DynamicImage::ImageRgb8(image::RgbImage::from_raw(
            width,
            height,
            samples[..pixels * 3].to_vec(),
        )?),
        4 => {
            let rgb = samples[..pixels * 4]
                .chunks_exact(4)
                .flat_map(|cmyk| cmyk_to_rgb(cmyk[0], cmyk[1], cmyk[2], cmyk[3]))
                .collect();
            image::DynamicImage::ImageRgb8(image::RgbImage::from_raw(width, height, rgb)?)
        }
        _ => return None,
    };

    let mut data = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut data), image::ImageFormat::Png)
        .ok()?;
    Some(RawImage {
        data,
        format: RawImageFormat::Png,
    })
}

fn cmyk_to_rgb(c: u8, m: u8, y: u8, k: u8) -> [u8; 3] {
    let k = 255 - u16::from(k);
    let channel = |v: u8| ((255 - u16::from(v)) * k / 255) as u8;
    [channel(c), channel(m), channel(y)]
}

/// Number of colour components for Gray/RGB/CMYK spaces (ICC via `/N`)
fn color_components(doc: &Document, dict: &Dictionary) -> Option<usize> {
    let space = resolve(doc, dict.get(b"ColorSpace").ok()?);
    match space {
        Object::Name(name) => match name.as_slice() {
            b"DeviceGray" | b"G" => Some(1),
            b"DeviceRGB" | b"RGB" => Some(3),
            b"DeviceCMYK" | b"CMYK" => Some(4),
            _ => None,
        },
        Object::Array(arr) => {
            let family = arr.first()?.as_name().ok()?;
            if family != b"ICCBased" {
                return None;
            }
            let profile = resolve(doc, arr.get(1)?).as_stream().ok()?;
            dict_u32(&profile.dict, b"N").map(|n| n as usize)
        }
        _ => None,
    }
}

fn filter_names(doc: &Document, dict: &Dictionary) -> Vec<String> {
    let Ok(filter) = dict.get(b"Filter") else {
        return Vec::new();
    };
    match resolve(doc, filter) {
        Object::Name(name) => vec![String::from_utf8_lossy(name).into_owned()],
        Object::Array(arr) => arr
            .iter()
            .filter_map(|item| resolve(doc, item).as_name().ok())
            .map(|name| String::from_utf8_lossy(name).into_owned())
            .collect(),
        _ => Vec::new(),
    }
}

fn stream_bytes(stream: &Stream) -> Option<Vec<u8>> {
    if stream.dict.get(b"Filter").is_ok() {
        stream.decompressed_content().ok()
    } else {
        Some(stream.content.clone())
    }
}

fn lookup_xobject<'a>(
    doc: &'a Document,
    resources: Option<&'a Dictionary>,
    name: &[u8],
) -> Option<(ObjectId, &'a Stream)> {
    let xobjects = resolve(doc, resources?.get(b"XObject").ok()?).as_dict().ok()?;
    let id = xobjects.get(name).ok()?.as_reference().ok()?;
    let stream = doc.get_object(id).ok()?.as_stream().ok()?;
    Some((id, stream))
}

fn page_resources(doc: &Document, page_id: ObjectId) -> Result<Option<&Dictionary>, BackendError> {
    Ok(resolve_inherited(doc, page_id, b"Resources")?
        .and_then(|obj| resolve(doc, obj).as_dict().ok()))
}

/// Look up a key on the page, walking up the page tree via /Parent
fn resolve_inherited<'a>(
    doc: &'a Document,
    page_id: ObjectId,
    key: &[u8],
) -> Result<Option<&'a Object>, BackendError> {
    let mut current = page_id;
    for _ in 0..64 {
        let dict = doc.get_object(current)?.as_dict()?;
        if let Ok(value) = dict.get(key) {
            return Ok(Some(value));
        }
        match dict.get(b"Parent").and_then(Object::as_reference) {
            Ok(parent) => current = parent,
            Err(_) => return Ok(None),
        }
    }
    Err(BackendError::generic("page tree /Parent chain too deep"))
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        other => other,
    }
}

fn subtype(dict: &Dictionary) -> Option<&[u8]> {
    dict.get(b"Subtype").ok()?.as_name().ok()
}

fn dict_u32(dict: &Dictionary, key: &[u8]) -> Option<u32> {
    let value = dict.get(key).ok()?.as_i64().ok()?;
    u32::try_from(value).ok().filter(|v| *v > 0)
}

fn box_from_array(arr: &[Object]) -> Option<(f32, f32, f32, f32)> {
    if arr.len() != 4 {
        return None;
    }
    let x0 = object_to_f32(&arr[0])?;
    let y0 = object_to_f32(&arr[1])?;
    let x1 = object_to_f32(&arr[2])?;
    let y1 = object_to_f32(&arr[3])?;
    Some((x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1)))
}

fn object_to_f32(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(f) => Some(*f),
        _ => None,
    }
}
