use super::{GraphTileDecodingError, SHAPE_PRECISION};
use bytes::BufMut;
use bytes_varint::{VarIntSupport, VarIntSupportMut};
use geo::{Coord, LineString, coord};

/// Edge information shared by both directions of an edge.
///
/// Encoded as a varint way ID, a varint point count,
/// then the shape as zigzag varint deltas at 1e-6 degrees
/// (the first point is relative to zero).
#[derive(Clone, Debug)]
pub struct EdgeInfo<'a> {
    way_id: u64,
    point_count: usize,
    encoded_shape: &'a [u8],
}

impl EdgeInfo<'_> {
    /// The OSM way ID this edge came from (zero if unknown).
    #[inline]
    pub fn way_id(&self) -> u64 {
        self.way_id
    }

    #[inline]
    pub fn point_count(&self) -> usize {
        self.point_count
    }

    /// Lazily decodes the shape, in the stored (forward) orientation.
    pub fn shape(&self) -> ShapeIter<'_> {
        ShapeIter {
            remaining: self.point_count,
            bytes: self.encoded_shape,
            x: 0,
            y: 0,
        }
    }

    /// Decodes the full shape, in the stored (forward) orientation.
    ///
    /// # Errors
    ///
    /// Fails if the encoded shape is truncated.
    pub fn decode_shape(&self) -> Result<LineString<f64>, GraphTileDecodingError> {
        let coords = self.shape().collect::<Result<Vec<_>, _>>()?;
        Ok(LineString::new(coords))
    }
}

impl<'a> TryFrom<&'a [u8]> for EdgeInfo<'a> {
    type Error = GraphTileDecodingError;

    fn try_from(bytes: &'a [u8]) -> Result<Self, Self::Error> {
        let mut cursor = bytes;
        let way_id = cursor
            .try_get_u64_varint()
            .map_err(|_| GraphTileDecodingError::Varint)?;
        let point_count = cursor
            .try_get_u64_varint()
            .map_err(|_| GraphTileDecodingError::Varint)?;
        Ok(Self {
            way_id,
            point_count: usize::try_from(point_count).map_err(|_| GraphTileDecodingError::Varint)?,
            encoded_shape: cursor,
        })
    }
}

/// Iterator over the points of an encoded shape.
///
/// Yields an error (and then stops) if the encoding is truncated.
pub struct ShapeIter<'a> {
    remaining: usize,
    bytes: &'a [u8],
    x: i64,
    y: i64,
}

impl Iterator for ShapeIter<'_> {
    type Item = Result<Coord<f64>, GraphTileDecodingError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let delta = self
            .bytes
            .try_get_i64_varint()
            .and_then(|dx| self.bytes.try_get_i64_varint().map(|dy| (dx, dy)));
        let next = delta
            .ok()
            .and_then(|(dx, dy)| Some((self.x.checked_add(dx)?, self.y.checked_add(dy)?)));
        match next {
            Some((x, y)) => {
                self.x = x;
                self.y = y;
                Some(Ok(coord! {
                    x: self.x as f64 / SHAPE_PRECISION,
                    y: self.y as f64 / SHAPE_PRECISION,
                }))
            }
            None => {
                self.remaining = 0;
                Some(Err(GraphTileDecodingError::Varint))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}

/// Appends the encoded edge info to `out`.
pub(crate) fn encode_edge_info(way_id: u64, shape: &[Coord<f64>], out: &mut impl BufMut) {
    out.put_u64_varint(way_id);
    out.put_u64_varint(shape.len() as u64);
    let (mut x, mut y) = (0i64, 0i64);
    for point in shape {
        let next_x = (point.x * SHAPE_PRECISION).round() as i64;
        let next_y = (point.y * SHAPE_PRECISION).round() as i64;
        out.put_i64_varint(next_x - x);
        out.put_i64_varint(next_y - y);
        x = next_x;
        y = next_y;
    }
}

/// Encodes a shape as a polyline with six digits of precision (latitude first).
pub fn encode_polyline6(shape: &LineString<f64>) -> String {
    let mut encoded = String::new();
    let (mut last_x, mut last_y) = (0i64, 0i64);
    for point in shape.coords() {
        let x = (point.x * SHAPE_PRECISION).round() as i64;
        let y = (point.y * SHAPE_PRECISION).round() as i64;
        push_polyline_value(&mut encoded, y - last_y);
        push_polyline_value(&mut encoded, x - last_x);
        last_x = x;
        last_y = y;
    }
    encoded
}

fn push_polyline_value(out: &mut String, delta: i64) {
    let mut value = ((delta << 1) ^ (delta >> 63)) as u64;
    while value >= 0x20 {
        out.push(char::from(((value & 0x1f) | 0x20) as u8 + 63));
        value >>= 5;
    }
    out.push(char::from(value as u8 + 63));
}
