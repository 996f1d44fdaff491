//! Stanford PLY loading (ascii, binary little- and big-endian)
//!
//! Recognised vertex properties: `x y z`, `nx ny nz`, texture coordinates as
//! `s t`, `u v` or `texture_u texture_v`, and `red green blue`. Faces come
//! from a `vertex_indices` (or `vertex_index`) list and are fan-triangulated;
//! a per-face `texcoord` list overrides vertex UVs. Each
//! `comment TextureFile <name>` header line declares one material, selected
//! per face by an optional `texnumber` property.

use super::{ModelLoader, TextureResolver};
use crate::error::{AssetError, Result};
use crate::model::{face_normal, MaterialInfo, MeshBuilder, MeshRecord, TextureChannel};
use crate::vertex::{Vertex, NO_MATERIAL};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

pub(crate) const EXTENSIONS: &[&str] = &["ply"];

/// PLY loader
#[derive(Debug, Clone, Default)]
pub struct PlyLoader {
    resolver: TextureResolver,
}

impl PlyLoader {
    pub fn new(resolver: TextureResolver) -> Self {
        Self { resolver }
    }

    fn materials(&self, header: &Header, model_dir: &Path) -> Vec<MaterialInfo> {
        header
            .texture_files
            .iter()
            .map(|name| {
                let mut info = MaterialInfo::default();
                info.set_path(TextureChannel::Diffuse, self.resolver.resolve(name, model_dir));
                info
            })
            .collect()
    }
}

impl ModelLoader for PlyLoader {
    fn load(&self, path: &Path) -> Result<MeshRecord> {
        let bytes = std::fs::read(path).map_err(|e| AssetError::io(path, e))?;
        let (header, body_start) =
            Header::parse(&bytes).map_err(|message| AssetError::parse(path, message))?;

        let model_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let materials = self.materials(&header, model_dir);
        let builder = read_body(&header, &bytes[body_start..], materials.len())
            .map_err(|message| AssetError::parse(path, message))?;

        log::debug!(
            "PLY {} ({:?}): {} vertices, {} indices, {} materials",
            path.display(),
            header.encoding,
            builder.vertex_count(),
            builder.index_count(),
            materials.len()
        );
        Ok(builder.build(materials))
    }

    fn pre_parse_texture_paths(&self, path: &Path) -> Vec<MaterialInfo> {
        let header = File::open(path)
            .map_err(|e| e.to_string())
            .and_then(|file| Header::read_only(BufReader::new(file)));
        match header {
            Ok(header) => {
                let model_dir = path.parent().unwrap_or_else(|| Path::new("."));
                self.materials(&header, model_dir)
            }
            Err(e) => {
                log::debug!("PLY pre-parse of {} skipped: {e}", path.display());
                Vec::new()
            }
        }
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        EXTENSIONS
    }

    fn format_name(&self) -> &'static str {
        "PLY"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Ascii,
    BinaryLittleEndian,
    BinaryBigEndian,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scalar {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    F32,
    F64,
}

impl Scalar {
    fn parse(name: &str) -> std::result::Result<Self, String> {
        Ok(match name {
            "char" | "int8" => Self::I8,
            "uchar" | "uint8" => Self::U8,
            "short" | "int16" => Self::I16,
            "ushort" | "uint16" => Self::U16,
            "int" | "int32" => Self::I32,
            "uint" | "uint32" => Self::U32,
            "float" | "float32" => Self::F32,
            "double" | "float64" => Self::F64,
            other => return Err(format!("unknown property type '{other}'")),
        })
    }

    const fn size(self) -> usize {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::F64 => 8,
        }
    }

    const fn is_integer(self) -> bool {
        !matches!(self, Self::F32 | Self::F64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PropertyKind {
    Scalar(Scalar),
    List { count: Scalar, item: Scalar },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Property {
    name: String,
    kind: PropertyKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Element {
    name: String,
    count: usize,
    properties: Vec<Property>,
}

impl Property {
    /// Fewest body bytes one value of this property can occupy
    fn min_bytes(&self, encoding: Encoding) -> usize {
        match (encoding, self.kind) {
            (Encoding::Ascii, _) => 1,
            (_, PropertyKind::Scalar(ty)) => ty.size(),
            (_, PropertyKind::List { count, .. }) => count.size(),
        }
    }
}

impl Element {
    fn min_row_bytes(&self, encoding: Encoding) -> usize {
        self.properties.iter().map(|p| p.min_bytes(encoding)).sum()
    }

    fn position(&self, names: &[&str]) -> Option<usize> {
        self.properties
            .iter()
            .position(|p| names.contains(&p.name.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Header {
    encoding: Encoding,
    elements: Vec<Element>,
    texture_files: Vec<String>,
}

impl Header {
    /// Parse the header at the start of `bytes`, returning it with the
    /// offset of the first body byte
    fn parse(bytes: &[u8]) -> std::result::Result<(Self, usize), String> {
        let mut builder = HeaderBuilder::default();
        let mut offset = 0;
        while offset < bytes.len() {
            let end = bytes[offset..]
                .iter()
                .position(|&b| b == b'\n')
                .map(|p| offset + p + 1)
                .unwrap_or(bytes.len());
            let line = std::str::from_utf8(&bytes[offset..end])
                .map_err(|_| "header is not valid text".to_string())?;
            offset = end;
            if builder.line(line)? {
                return Ok((builder.finish()?, offset));
            }
        }
        Err("missing end_header".into())
    }

    /// Parse only the header from a reader, never touching the body
    fn read_only(reader: impl BufRead) -> std::result::Result<Self, String> {
        let mut builder = HeaderBuilder::default();
        for line in reader.split(b'\n') {
            let line = line.map_err(|e| e.to_string())?;
            let line = String::from_utf8(line).map_err(|_| "header is not valid text".to_string())?;
            if builder.line(&line)? {
                return builder.finish();
            }
        }
        Err("missing end_header".into())
    }
}

#[derive(Default)]
struct HeaderBuilder {
    saw_magic: bool,
    encoding: Option<Encoding>,
    elements: Vec<Element>,
    texture_files: Vec<String>,
}

impl HeaderBuilder {
    /// Feed one header line; returns true after `end_header`
    fn line(&mut self, line: &str) -> std::result::Result<bool, String> {
        let line = line.trim();
        if !self.saw_magic {
            if line != "ply" {
                return Err("missing 'ply' magic".into());
            }
            self.saw_magic = true;
            return Ok(false);
        }

        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("format") => {
                self.encoding = Some(match tokens.next() {
                    Some("ascii") => Encoding::Ascii,
                    Some("binary_little_endian") => Encoding::BinaryLittleEndian,
                    Some("binary_big_endian") => Encoding::BinaryBigEndian,
                    other => return Err(format!("unknown format {other:?}")),
                });
            }
            Some("comment") => {
                let mut rest = line["comment".len()..].trim_start().splitn(2, char::is_whitespace);
                if rest.next().is_some_and(|k| k.eq_ignore_ascii_case("TextureFile")) {
                    if let Some(name) = rest.next().map(str::trim).filter(|n| !n.is_empty()) {
                        self.texture_files.push(name.to_string());
                    }
                }
            }
            Some("element") => {
                let name = tokens.next().ok_or("element without name")?;
                let count = tokens
                    .next()
                    .and_then(|c| c.parse().ok())
                    .ok_or_else(|| format!("element '{name}' has no count"))?;
                self.elements.push(Element {
                    name: name.to_string(),
                    count,
                    properties: Vec::new(),
                });
            }
            Some("property") => {
                let element = self
                    .elements
                    .last_mut()
                    .ok_or("property before any element")?;
                let kind = match tokens.next() {
                    Some("list") => PropertyKind::List {
                        count: Scalar::parse(tokens.next().unwrap_or_default())?,
                        item: Scalar::parse(tokens.next().unwrap_or_default())?,
                    },
                    Some(ty) => PropertyKind::Scalar(Scalar::parse(ty)?),
                    None => return Err("property without type".into()),
                };
                let name = tokens.next().ok_or("property without name")?;
                element.properties.push(Property {
                    name: name.to_string(),
                    kind,
                });
            }
            Some("end_header") => return Ok(true),
            Some("obj_info") | None => {}
            Some(other) => return Err(format!("unexpected header keyword '{other}'")),
        }
        Ok(false)
    }

    fn finish(self) -> std::result::Result<Header, String> {
        Ok(Header {
            encoding: self.encoding.ok_or("missing format line")?,
            elements: self.elements,
            texture_files: self.texture_files,
        })
    }
}

/// Sequential reader of typed values from the body
enum Values<'a> {
    Ascii(std::str::SplitAsciiWhitespace<'a>),
    Binary { data: &'a [u8], pos: usize, big_endian: bool },
}

impl<'a> Values<'a> {
    fn new(encoding: Encoding, body: &'a [u8]) -> std::result::Result<Self, String> {
        Ok(match encoding {
            Encoding::Ascii => Values::Ascii(
                std::str::from_utf8(body)
                    .map_err(|_| "ascii body is not valid text".to_string())?
                    .split_ascii_whitespace(),
            ),
            Encoding::BinaryLittleEndian => Values::Binary {
                data: body,
                pos: 0,
                big_endian: false,
            },
            Encoding::BinaryBigEndian => Values::Binary {
                data: body,
                pos: 0,
                big_endian: true,
            },
        })
    }

    fn read(&mut self, ty: Scalar) -> std::result::Result<f64, String> {
        match self {
            Values::Ascii(tokens) => {
                let token = tokens.next().ok_or("unexpected end of data")?;
                let value: f64 = token
                    .parse()
                    .map_err(|_| format!("invalid number '{token}'"))?;
                if ty.is_integer() && value.fract() != 0.0 {
                    return Err(format!("expected integer, found '{token}'"));
                }
                Ok(value)
            }
            Values::Binary {
                data,
                pos,
                big_endian,
            } => {
                let size = ty.size();
                let raw = data
                    .get(*pos..*pos + size)
                    .ok_or("unexpected end of data")?;
                *pos += size;
                let mut buf = [0u8; 8];
                buf[..size].copy_from_slice(raw);
                if *big_endian {
                    buf[..size].reverse();
                }
                // buf now holds little-endian bytes
                Ok(match ty {
                    Scalar::I8 => buf[0] as i8 as f64,
                    Scalar::U8 => buf[0] as f64,
                    Scalar::I16 => i16::from_le_bytes([buf[0], buf[1]]) as f64,
                    Scalar::U16 => u16::from_le_bytes([buf[0], buf[1]]) as f64,
                    Scalar::I32 => i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f64,
                    Scalar::U32 => u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f64,
                    Scalar::F32 => f32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f64,
                    Scalar::F64 => f64::from_le_bytes(buf),
                })
            }
        }
    }

    /// Read one element instance; lists land in `lists`, scalars in `scalars`
    fn read_row(
        &mut self,
        element: &Element,
        scalars: &mut Vec<f64>,
        lists: &mut Vec<Vec<f64>>,
    ) -> std::result::Result<(), String> {
        scalars.clear();
        lists.clear();
        for property in &element.properties {
            match property.kind {
                PropertyKind::Scalar(ty) => scalars.push(self.read(ty)?),
                PropertyKind::List { count, item } => {
                    let n = self.read(count)?;
                    if n < 0.0 {
                        return Err(format!("negative list length in '{}'", property.name));
                    }
                    let items = (0..n as usize)
                        .map(|_| self.read(item))
                        .collect::<std::result::Result<Vec<_>, _>>()?;
                    scalars.push(f64::NAN);
                    lists.push(items);
                }
            }
        }
        Ok(())
    }
}

/// Column lookups for the vertex element
struct VertexLayout {
    position: [usize; 3],
    normal: Option<[usize; 3]>,
    uv: Option<[usize; 2]>,
    color: Option<([usize; 3], bool)>,
}

impl VertexLayout {
    fn new(element: &Element) -> std::result::Result<Self, String> {
        let find = |names: &[&str]| element.position(names);
        let triple = |a: &str, b: &str, c: &str| Some([find(&[a])?, find(&[b])?, find(&[c])?]);

        let position = triple("x", "y", "z").ok_or("vertex element lacks x/y/z")?;
        let normal = triple("nx", "ny", "nz");
        let uv = [("s", "t"), ("u", "v"), ("texture_u", "texture_v")]
            .iter()
            .find_map(|&(u, v)| Some([find(&[u])?, find(&[v])?]));
        let color = triple("red", "green", "blue").map(|columns| {
            let integer = matches!(
                element.properties[columns[0]].kind,
                PropertyKind::Scalar(ty) if ty.is_integer()
            );
            (columns, integer)
        });

        Ok(Self {
            position,
            normal,
            uv,
            color,
        })
    }

    fn vertex(&self, row: &[f64]) -> Vertex {
        let pick3 = |c: [usize; 3]| [row[c[0]] as f32, row[c[1]] as f32, row[c[2]] as f32];
        let mut vertex = Vertex::new(
            pick3(self.position),
            self.normal.map(pick3).unwrap_or([0.0, 0.0, 1.0]),
            self.uv
                .map(|c| [row[c[0]] as f32, 1.0 - row[c[1]] as f32])
                .unwrap_or([0.0, 0.0]),
        );
        if let Some((columns, integer)) = self.color {
            let scale = if integer { 1.0 / 255.0 } else { 1.0 };
            let rgb = pick3(columns);
            vertex = vertex.with_color(rgb.map(|c| c * scale));
        }
        vertex
    }
}

/// Reject element counts the body is too short to hold
fn check_counts(header: &Header, body_len: usize) -> std::result::Result<(), String> {
    let mut required = 0usize;
    for element in &header.elements {
        let rows = element
            .count
            .checked_mul(element.min_row_bytes(header.encoding))
            .and_then(|bytes| required.checked_add(bytes));
        match rows {
            Some(total) if total <= body_len => required = total,
            _ => {
                return Err(format!(
                    "element '{}' declares {} rows but the body has only {body_len} bytes",
                    element.name, element.count
                ))
            }
        }
    }
    Ok(())
}

fn read_body(header: &Header, body: &[u8], material_count: usize) -> std::result::Result<MeshBuilder, String> {
    check_counts(header, body.len())?;
    let mut values = Values::new(header.encoding, body)?;
    let mut scalars = Vec::new();
    let mut lists = Vec::new();

    let mut vertices: Vec<Vertex> = Vec::new();
    let mut has_normals = false;
    let mut builder = MeshBuilder::new();

    for element in &header.elements {
        match element.name.as_str() {
            "vertex" => {
                let layout = VertexLayout::new(element)?;
                has_normals = layout.normal.is_some();
                vertices.reserve(element.count);
                for _ in 0..element.count {
                    values.read_row(element, &mut scalars, &mut lists)?;
                    vertices.push(layout.vertex(&scalars));
                }
            }
            "face" => {
                let list_columns: Vec<usize> = element
                    .properties
                    .iter()
                    .enumerate()
                    .filter(|(_, p)| matches!(p.kind, PropertyKind::List { .. }))
                    .map(|(i, _)| i)
                    .collect();
                // Index into `lists` for a named list property
                let list_slot = |names: &[&str]| {
                    element
                        .position(names)
                        .and_then(|column| list_columns.iter().position(|&c| c == column))
                };
                let indices_slot = list_slot(&["vertex_indices", "vertex_index"])
                    .ok_or("face element lacks a vertex_indices list")?;
                let texcoord_slot = list_slot(&["texcoord"]);
                let texnumber = element.position(&["texnumber"]);

                for _ in 0..element.count {
                    values.read_row(element, &mut scalars, &mut lists)?;
                    let material_index = if material_count == 0 {
                        NO_MATERIAL
                    } else {
                        let n = texnumber.map(|c| scalars[c] as usize).unwrap_or(0);
                        if n < material_count { n as i32 } else { NO_MATERIAL }
                    };
                    add_face(
                        &mut builder,
                        &vertices,
                        &lists[indices_slot],
                        texcoord_slot.map(|s| lists[s].as_slice()),
                        material_index,
                        has_normals,
                    )?;
                }
            }
            // Rows without properties carry no bytes
            _ if element.properties.is_empty() => {}
            _ => {
                for _ in 0..element.count {
                    values.read_row(element, &mut scalars, &mut lists)?;
                }
            }
        }
    }

    Ok(builder)
}

fn add_face(
    builder: &mut MeshBuilder,
    vertices: &[Vertex],
    polygon: &[f64],
    texcoords: Option<&[f64]>,
    material_index: i32,
    has_normals: bool,
) -> std::result::Result<(), String> {
    let corner = |k: usize| -> std::result::Result<Vertex, String> {
        let index = polygon[k];
        let mut vertex = *vertices
            .get(index as usize)
            .filter(|_| index >= 0.0)
            .ok_or_else(|| format!("face index {index} out of range for {} vertices", vertices.len()))?;
        if let Some(uv) = texcoords.filter(|t| t.len() == polygon.len() * 2) {
            vertex.uv = [uv[2 * k] as f32, 1.0 - uv[2 * k + 1] as f32];
        }
        Ok(vertex.with_material(material_index))
    };

    // Fan triangulation; polygons with fewer than three corners contribute nothing
    for k in 1..polygon.len().saturating_sub(1) {
        let mut triangle = [corner(0)?, corner(k)?, corner(k + 1)?];
        if !has_normals {
            let n = face_normal(triangle[0].position, triangle[1].position, triangle[2].position);
            for v in &mut triangle {
                v.normal = n;
            }
        }
        builder.push_triangle(triangle);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const ASCII_QUAD: &str = "\
ply
format ascii 1.0
comment exported for tests
comment TextureFile wall.png
element vertex 4
property float x
property float y
property float z
property float s
property float t
property uchar red
property uchar green
property uchar blue
element face 1
property list uchar int vertex_indices
end_header
0 0 0 0 0 255 0 0
1 0 0 1 0 255 255 255
1 1 0 1 1 255 255 255
0 1 0 0 1 255 255 255
4 0 1 2 3
";

    fn binary_triangle(big_endian: bool) -> Vec<u8> {
        let format = if big_endian {
            "binary_big_endian"
        } else {
            "binary_little_endian"
        };
        let mut bytes = format!(
            "ply\nformat {format} 1.0\nelement vertex 3\nproperty float x\nproperty float y\n\
             property float z\nelement face 1\nproperty list uchar uint vertex_indices\nend_header\n"
        )
        .into_bytes();
        let f = |v: f32| if big_endian { v.to_be_bytes() } else { v.to_le_bytes() };
        let u = |v: u32| if big_endian { v.to_be_bytes() } else { v.to_le_bytes() };
        for p in [[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]] {
            for c in p {
                bytes.extend_from_slice(&f(c));
            }
        }
        bytes.push(3);
        for i in [0u32, 1, 2] {
            bytes.extend_from_slice(&u(i));
        }
        bytes
    }

    #[test]
    fn test_ascii_quad() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("wall.png"), b"png").unwrap();
        let path = dir.path().join("quad.ply");
        fs::write(&path, ASCII_QUAD).unwrap();

        let mesh = PlyLoader::default().load(&path).unwrap();
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.indices, vec![0, 1, 2, 0, 2, 3]);
        assert_eq!(mesh.materials.len(), 1);
        assert_eq!(mesh.materials[0].diffuse, Some(dir.path().join("wall.png")));
        assert!(mesh.vertices.iter().all(|v| v.material_index == 0));

        let first = mesh.vertices[0];
        assert_eq!(first.color, [1.0, 0.0, 0.0]);
        assert_eq!(first.uv, [0.0, 1.0]);
        assert_eq!(first.normal, [0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_binary_both_endians() {
        for big_endian in [false, true] {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("tri.ply");
            fs::write(&path, binary_triangle(big_endian)).unwrap();

            let mesh = PlyLoader::default().load(&path).unwrap();
            assert_eq!(mesh.vertex_count(), 3, "big_endian={big_endian}");
            assert_eq!(mesh.vertices[1].position, [1.0, 0.0, 0.0]);
            assert!(mesh.materials.is_empty());
            assert!(mesh.vertices.iter().all(|v| v.material_index == NO_MATERIAL));
        }
    }

    #[test]
    fn test_pre_parse_reads_header_only() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("wall.png"), b"png").unwrap();
        let path = dir.path().join("quad.ply");
        // Body truncated: the pre-parse must not care
        let header_only = ASCII_QUAD.split("end_header").next().unwrap().to_string() + "end_header\n";
        fs::write(&path, header_only).unwrap();

        let loader = PlyLoader::default();
        let materials = loader.pre_parse_texture_paths(&path);
        assert_eq!(materials.len(), 1);
        assert!(matches!(loader.load(&path), Err(AssetError::Parse { .. })));
    }

    #[test]
    fn test_out_of_range_face() {
        let text = "ply\nformat ascii 1.0\nelement vertex 1\nproperty float x\nproperty float y\n\
                    property float z\nelement face 1\nproperty list uchar int vertex_indices\n\
                    end_header\n0 0 0\n3 0 1 2\n";
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.ply");
        fs::write(&path, text).unwrap();
        assert!(matches!(
            PlyLoader::default().load(&path),
            Err(AssetError::Parse { .. })
        ));
    }

    #[test]
    fn test_huge_vertex_count_is_parse_error() {
        let text = "ply\nformat ascii 1.0\nelement vertex 100000000000000000\nproperty float x\n\
                    property float y\nproperty float z\nend_header\n0 0 0\n";
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.ply");
        fs::write(&path, text).unwrap();
        assert!(matches!(
            PlyLoader::default().load(&path),
            Err(AssetError::Parse { .. })
        ));

        // Binary rows are checked against their fixed size, and overflow is caught
        let mut bytes = b"ply\nformat binary_little_endian 1.0\nelement vertex 18446744073709551615\n\
                          property double x\nproperty double y\nproperty double z\nend_header\n"
            .to_vec();
        bytes.extend_from_slice(&[0u8; 24]);
        fs::write(&path, bytes).unwrap();
        assert!(matches!(
            PlyLoader::default().load(&path),
            Err(AssetError::Parse { .. })
        ));
    }

    #[test]
    fn test_count_checked_against_body_length() {
        let (header, start) = Header::parse(binary_triangle(false).as_slice()).unwrap();
        let body_len = binary_triangle(false).len() - start;
        assert!(check_counts(&header, body_len).is_ok());
        assert!(check_counts(&header, body_len - 13).is_err());
    }

    #[test]
    fn test_not_a_ply() {
        assert!(Header::parse(b"solid cube\nendsolid\n").is_err());
        assert!(Header::parse(b"ply\nformat ascii 1.0\n").is_err());
    }
}
