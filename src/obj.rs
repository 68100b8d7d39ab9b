use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use glam::{Vec2, Vec3};

use crate::render::TexturedVertex;

/// Triangle mesh read from an OBJ file, ready for a textured [`crate::render::Mesh`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjMesh {
    pub vertices: Vec<TexturedVertex>,
    pub indices: Vec<u32>,
    /// Whether the file supplied `vt` coordinates.
    pub has_tex_coords: bool,
}

impl ObjMesh {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Axis-aligned bounds as `(min, max)`.
    pub fn bounds(&self) -> (Vec3, Vec3) {
        self.vertices.iter().fold(
            (Vec3::splat(f32::MAX), Vec3::splat(f32::MIN)),
            |(min, max), vertex| {
                let position = Vec3::from(vertex.position);
                (min.min(position), max.max(position))
            },
        )
    }

    /// Moves the mesh to the origin and scales it to fit a sphere of `radius`.
    pub fn fit_to_radius(&mut self, radius: f32) {
        if self.vertices.is_empty() {
            return;
        }
        let (min, max) = self.bounds();
        let center = (min + max) * 0.5;
        let extent = self
            .vertices
            .iter()
            .map(|vertex| (Vec3::from(vertex.position) - center).length())
            .fold(0.0_f32, f32::max);
        let scale = if extent > f32::EPSILON {
            radius / extent
        } else {
            1.0
        };
        for vertex in &mut self.vertices {
            vertex.position = ((Vec3::from(vertex.position) - center) * scale).into();
        }
    }
}

pub fn load_obj<P: AsRef<Path>>(path: P) -> Result<ObjMesh> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)
        .with_context(|| format!("unable to read OBJ file {}", path.display()))?;
    load_obj_from_str(&contents).with_context(|| format!("failed to parse OBJ mesh {}", path.display()))
}

/// Parses an OBJ file from memory. Polygons are fanned into triangles and
/// missing normals are generated from the faces.
pub fn load_obj_from_str(data: &str) -> Result<ObjMesh> {
    let mut positions = Vec::new();
    let mut tex_coords = Vec::new();
    let mut normals = Vec::new();
    let mut faces: Vec<[FaceIndex; 3]> = Vec::new();

    for (line_no, line) in data.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let mut parts = trimmed.split_whitespace();
        let Some(tag) = parts.next() else {
            continue;
        };
        match tag {
            "v" => positions.push(
                parse_vec3(parts)
                    .with_context(|| format!("invalid vertex on line {}", line_no + 1))?,
            ),
            "vt" => tex_coords.push(
                parse_vec2(parts)
                    .with_context(|| format!("invalid texture coordinate on line {}", line_no + 1))?,
            ),
            "vn" => normals.push(
                parse_vec3(parts)
                    .with_context(|| format!("invalid normal on line {}", line_no + 1))?,
            ),
            "f" => {
                let polygon = parse_face(parts)
                    .with_context(|| format!("invalid face on line {}", line_no + 1))?;
                triangulate_face(&polygon, &mut faces);
            }
            _ => {}
        }
    }

    if positions.is_empty() {
        return Err(anyhow!("OBJ file does not define any vertices"));
    }
    if faces.is_empty() {
        return Err(anyhow!("OBJ file does not define any faces"));
    }

    let mut mesh = build_mesh(&positions, &tex_coords, &normals, &faces)?;
    if needs_normals(&mesh.vertices) {
        compute_normals(&mut mesh);
    }
    Ok(mesh)
}

fn next_component<'a>(parts: &mut impl Iterator<Item = &'a str>) -> Result<f32> {
    Ok(parts
        .next()
        .ok_or_else(|| anyhow!("missing vector component"))?
        .parse::<f32>()?)
}

fn parse_vec3<'a>(mut parts: impl Iterator<Item = &'a str>) -> Result<Vec3> {
    let x = next_component(&mut parts)?;
    let y = next_component(&mut parts)?;
    let z = next_component(&mut parts)?;
    Ok(Vec3::new(x, y, z))
}

fn parse_vec2<'a>(mut parts: impl Iterator<Item = &'a str>) -> Result<Vec2> {
    let u = next_component(&mut parts)?;
    let v = next_component(&mut parts)?;
    Ok(Vec2::new(u, v))
}

fn parse_optional_index(segment: Option<&str>) -> Result<i32> {
    match segment {
        None | Some("") => Ok(0),
        Some(value) => Ok(value.parse::<i32>()?),
    }
}

fn parse_face<'a>(parts: impl Iterator<Item = &'a str>) -> Result<Vec<FaceIndex>> {
    let mut indices = Vec::new();
    for part in parts {
        let mut segments = part.split('/');
        let v = segments
            .next()
            .ok_or_else(|| anyhow!("missing vertex index"))?
            .parse::<i32>()?;
        let vt = parse_optional_index(segments.next())?;
        let vn = parse_optional_index(segments.next())?;
        indices.push(FaceIndex { v, vt, vn });
    }
    if indices.len() < 3 {
        return Err(anyhow!("faces must reference at least 3 vertices"));
    }
    Ok(indices)
}

fn triangulate_face(polygon: &[FaceIndex], faces: &mut Vec<[FaceIndex; 3]>) {
    for i in 1..(polygon.len() - 1) {
        faces.push([polygon[0], polygon[i], polygon[i + 1]]);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Key {
    position: usize,
    tex_coord: Option<usize>,
    normal: Option<usize>,
}

#[derive(Debug, Clone, Copy)]
struct FaceIndex {
    v: i32,
    vt: i32,
    vn: i32,
}

fn build_mesh(
    positions: &[Vec3],
    tex_coords: &[Vec2],
    normals: &[Vec3],
    faces: &[[FaceIndex; 3]],
) -> Result<ObjMesh> {
    let mut lookup: HashMap<Key, u32> = HashMap::new();
    let mut vertices = Vec::new();
    let mut indices = Vec::new();
    let mut has_tex_coords = false;

    for face in faces {
        for idx in face {
            let position =
                fix_index(idx.v, positions.len()).ok_or_else(|| anyhow!("invalid vertex index {}", idx.v))?;
            let key = Key {
                position,
                tex_coord: fix_index(idx.vt, tex_coords.len()),
                normal: fix_index(idx.vn, normals.len()),
            };
            has_tex_coords |= key.tex_coord.is_some();
            let entry = lookup.entry(key).or_insert_with(|| {
                // OBJ puts v = 0 at the bottom of the image.
                let uv = key
                    .tex_coord
                    .map(|i| Vec2::new(tex_coords[i].x, 1.0 - tex_coords[i].y))
                    .unwrap_or(Vec2::ZERO);
                vertices.push(TexturedVertex {
                    position: positions[key.position].into(),
                    normal: key.normal.map(|i| normals[i]).unwrap_or(Vec3::ZERO).into(),
                    tex_coord: uv.into(),
                });
                (vertices.len() - 1) as u32
            });
            indices.push(*entry);
        }
    }

    Ok(ObjMesh {
        vertices,
        indices,
        has_tex_coords,
    })
}

fn fix_index(index: i32, len: usize) -> Option<usize> {
    if index > 0 {
        let zero_based = index as usize - 1;
        (zero_based < len).then_some(zero_based)
    } else if index < 0 {
        let abs = index.unsigned_abs() as usize;
        (abs <= len).then_some(len - abs)
    } else {
        None
    }
}

fn needs_normals(vertices: &[TexturedVertex]) -> bool {
    vertices.iter().any(|vertex| vertex.normal == [0.0; 3])
}

fn compute_normals(mesh: &mut ObjMesh) {
    let mut accum = vec![Vec3::ZERO; mesh.vertices.len()];
    let position = |i: usize| Vec3::from(mesh.vertices[i].position);

    for triangle in mesh.indices.chunks_exact(3) {
        let [i0, i1, i2] = [triangle[0] as usize, triangle[1] as usize, triangle[2] as usize];
        let p0 = position(i0);
        let normal = (position(i1) - p0).cross(position(i2) - p0);
        if normal.length_squared() > f32::EPSILON {
            let normal = normal.normalize();
            accum[i0] += normal;
            accum[i1] += normal;
            accum[i2] += normal;
        }
    }

    for (vertex, normal) in mesh.vertices.iter_mut().zip(accum) {
        if vertex.normal == [0.0; 3] {
            vertex.normal = normal.normalize_or_zero().into();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_triangle() {
        let obj = "\nv 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";
        let mesh = load_obj_from_str(obj).unwrap();
        assert_eq!(mesh.indices, vec![0, 1, 2]);
        assert_eq!(mesh.vertices.len(), 3);
        assert!(!mesh.has_tex_coords);
    }

    #[test]
    fn computes_missing_normals() {
        let obj = "\nv 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";
        let mesh = load_obj_from_str(obj).unwrap();
        for vertex in &mesh.vertices {
            assert_eq!(Vec3::from(vertex.normal), Vec3::Z);
        }
    }

    #[test]
    fn reads_texture_coordinates_and_flips_v() {
        let obj = "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\n\
                   vt 0 0\nvt 1 0\nvt 1 1\nvt 0 1\n\
                   vn 0 0 1\n\
                   f 1/1/1 2/2/1 3/3/1 4/4/1\n";
        let mesh = load_obj_from_str(obj).unwrap();
        assert!(mesh.has_tex_coords);
        assert_eq!(mesh.triangle_count(), 2);
        assert_eq!(mesh.vertices[0].tex_coord, [0.0, 1.0]);
        assert_eq!(mesh.vertices[2].tex_coord, [1.0, 0.0]);
    }

    #[test]
    fn negative_indices_count_from_the_end() {
        let obj = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf -3 -2 -1\n";
        let mesh = load_obj_from_str(obj).unwrap();
        assert_eq!(mesh.vertices[2].position, [0.0, 1.0, 0.0]);
    }

    #[test]
    fn rejects_faces_referencing_missing_vertices() {
        let obj = "v 0 0 0\nv 1 0 0\nf 1 2 5\n";
        assert!(load_obj_from_str(obj).is_err());
    }

    #[test]
    fn fits_mesh_inside_radius() {
        let obj = "v 10 10 10\nv 14 10 10\nv 10 14 10\nf 1 2 3\n";
        let mut mesh = load_obj_from_str(obj).unwrap();
        mesh.fit_to_radius(1.0);
        for vertex in &mesh.vertices {
            assert!(Vec3::from(vertex.position).length() <= 1.0 + 1e-5);
        }
    }
}
