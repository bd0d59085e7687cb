//! Table region detection.
//!
//! Two strategies are available:
//!
//! * **Lines** rebuilds tables from painted rulings: segments are snapped and
//!   joined into edges, edges are crossed into intersections, intersections
//!   are closed into cells and cells sharing corners are grouped into tables.
//! * **Text** looks for spans that line up into rows and columns, without
//!   any ruling information.

use std::collections::{BTreeMap, HashMap, HashSet};

use super::layout::{PageMarks, Segment, TextSpan};
use crate::types::{Rect, TableGeometry};

/// How table regions are found on a page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TableStrategy {
    /// Ruling-based detection.
    #[default]
    Lines,
    /// Text-alignment detection.
    Text,
    /// Never report tables.
    None,
}

/// Run the selected strategy over one page's marks.
pub fn find_tables(strategy: TableStrategy, marks: &PageMarks) -> Vec<TableGeometry> {
    match strategy {
        TableStrategy::Lines => find_tables_from_rulings(&marks.rulings, &LatticeConfig::default()),
        TableStrategy::Text => {
            find_tables_from_text(&marks.spans, &TableDetectorConfig::default())
        }
        TableStrategy::None => Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Lines strategy
// ---------------------------------------------------------------------------

/// Tolerances for the ruling-based strategy, in points.
#[derive(Debug, Clone)]
pub struct LatticeConfig {
    /// Parallel segments this close are snapped onto a common coordinate.
    pub snap_tolerance: f32,
    /// Collinear segments separated by at most this gap are joined.
    pub join_tolerance: f32,
    /// Slack allowed when crossing a horizontal and a vertical edge.
    pub intersection_tolerance: f32,
    /// Edges shorter than this after joining are dropped.
    pub min_edge_length: f32,
}

impl Default for LatticeConfig {
    fn default() -> Self {
        Self {
            snap_tolerance: 3.0,
            join_tolerance: 3.0,
            intersection_tolerance: 3.0,
            min_edge_length: 3.0,
        }
    }
}

const COORD_EPSILON: f32 = 0.01;

fn approx_eq(a: f32, b: f32) -> bool {
    (a - b).abs() <= COORD_EPSILON
}

/// Detect tables from axis-aligned rulings.
pub fn find_tables_from_rulings(rulings: &[Segment], config: &LatticeConfig) -> Vec<TableGeometry> {
    let (horizontal, vertical): (Vec<Segment>, Vec<Segment>) =
        rulings.iter().copied().partition(|s| s.is_horizontal());

    let horizontal = merge_edges(horizontal, Axis::Horizontal, config);
    let vertical = merge_edges(vertical, Axis::Vertical, config);
    if horizontal.len() < 2 || vertical.len() < 2 {
        return Vec::new();
    }

    let grid = Intersections::new(&horizontal, &vertical, config.intersection_tolerance);
    let cells = grid.cells();
    let tables = group_cells(cells);

    log::debug!(
        "{} horizontal and {} vertical edges produced {} table(s)",
        horizontal.len(),
        vertical.len(),
        tables.len()
    );

    tables.into_iter().map(|cells| table_geometry(&cells)).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Horizontal,
    Vertical,
}

impl Axis {
    /// The coordinate shared by every point of the segment.
    fn position(self, s: &Segment) -> f32 {
        match self {
            Axis::Horizontal => s.y0,
            Axis::Vertical => s.x0,
        }
    }

    /// The segment's extent along its own direction.
    fn span(self, s: &Segment) -> (f32, f32) {
        match self {
            Axis::Horizontal => (s.x0, s.x1),
            Axis::Vertical => (s.y0, s.y1),
        }
    }

    fn segment(self, position: f32, start: f32, end: f32) -> Segment {
        match self {
            Axis::Horizontal => Segment {
                x0: start,
                y0: position,
                x1: end,
                y1: position,
            },
            Axis::Vertical => Segment {
                x0: position,
                y0: start,
                x1: position,
                y1: end,
            },
        }
    }
}

/// Snap parallel segments onto shared coordinates, then join collinear ones.
fn merge_edges(mut segments: Vec<Segment>, axis: Axis, config: &LatticeConfig) -> Vec<Segment> {
    if segments.is_empty() {
        return segments;
    }

    segments.sort_by(|a, b| {
        axis.position(a)
            .partial_cmp(&axis.position(b))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    // Snap: cluster by position and move each cluster onto its mean.
    let mut clusters: Vec<Vec<Segment>> = Vec::new();
    for seg in segments {
        match clusters.last_mut() {
            Some(cluster)
                if axis.position(&seg) - axis.position(&cluster[0]) <= config.snap_tolerance =>
            {
                cluster.push(seg)
            }
            _ => clusters.push(vec![seg]),
        }
    }

    let mut edges = Vec::new();
    for cluster in clusters {
        let position =
            cluster.iter().map(|s| axis.position(s)).sum::<f32>() / cluster.len() as f32;
        let mut extents: Vec<(f32, f32)> = cluster.iter().map(|s| axis.span(s)).collect();
        extents.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        // Join: merge overlapping or nearly touching extents.
        let mut current = extents[0];
        for &(start, end) in &extents[1..] {
            if start <= current.1 + config.join_tolerance {
                current.1 = current.1.max(end);
            } else {
                edges.push(axis.segment(position, current.0, current.1));
                current = (start, end);
            }
        }
        edges.push(axis.segment(position, current.0, current.1));
    }

    edges.retain(|e| {
        let (start, end) = axis.span(e);
        end - start >= config.min_edge_length
    });
    edges
}

/// Crossing points of horizontal and vertical edges, with the edges that
/// produced them.
struct Intersections<'a> {
    horizontal: &'a [Segment],
    vertical: &'a [Segment],
    tolerance: f32,
    points: Vec<(f32, f32)>,
}

impl<'a> Intersections<'a> {
    fn new(horizontal: &'a [Segment], vertical: &'a [Segment], tolerance: f32) -> Self {
        let mut points = Vec::new();
        for v in vertical {
            for h in horizontal {
                let crosses = v.x0 >= h.x0 - tolerance
                    && v.x0 <= h.x1 + tolerance
                    && h.y0 >= v.y0 - tolerance
                    && h.y0 <= v.y1 + tolerance;
                if crosses {
                    points.push((v.x0, h.y0));
                }
            }
        }
        // Top of page first, then left to right.
        points.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal))
        });
        points.dedup_by(|a, b| approx_eq(a.0, b.0) && approx_eq(a.1, b.1));

        Intersections {
            horizontal,
            vertical,
            tolerance,
            points,
        }
    }

    fn contains(&self, x: f32, y: f32) -> bool {
        self.points
            .iter()
            .any(|&(px, py)| approx_eq(px, x) && approx_eq(py, y))
    }

    /// Is there a horizontal edge running from `x_a` to `x_b` at height `y`?
    fn joined_horizontally(&self, y: f32, x_a: f32, x_b: f32) -> bool {
        let (lo, hi) = (x_a.min(x_b), x_a.max(x_b));
        self.horizontal.iter().any(|h| {
            approx_eq(h.y0, y) && h.x0 - self.tolerance <= lo && h.x1 + self.tolerance >= hi
        })
    }

    /// Is there a vertical edge running from `y_a` to `y_b` at `x`?
    fn joined_vertically(&self, x: f32, y_a: f32, y_b: f32) -> bool {
        let (lo, hi) = (y_a.min(y_b), y_a.max(y_b));
        self.vertical.iter().any(|v| {
            approx_eq(v.x0, x) && v.y0 - self.tolerance <= lo && v.y1 + self.tolerance >= hi
        })
    }

    /// Close intersections into the smallest rectangles bounded by edges.
    ///
    /// Every intersection is tried as a top-left corner; the nearest point
    /// below and the nearest point to the right that are connected to it are
    /// used when the opposite corner exists and is connected to both.
    fn cells(&self) -> Vec<Rect> {
        let mut cells = Vec::new();

        for (i, &(x, top)) in self.points.iter().enumerate() {
            let rest = &self.points[i + 1..];
            let below: Vec<f32> = rest
                .iter()
                .filter(|&&(px, py)| approx_eq(px, x) && py < top)
                .map(|&(_, py)| py)
                .collect();
            let right: Vec<f32> = rest
                .iter()
                .filter(|&&(px, py)| approx_eq(py, top) && px > x)
                .map(|&(px, _)| px)
                .collect();

            'search: for &bottom in &below {
                if !self.joined_vertically(x, top, bottom) {
                    continue;
                }
                for &x_right in &right {
                    if !self.joined_horizontally(top, x, x_right) {
                        continue;
                    }
                    if self.contains(x_right, bottom)
                        && self.joined_horizontally(bottom, x, x_right)
                        && self.joined_vertically(x_right, top, bottom)
                    {
                        cells.push(Rect::new(x, bottom, x_right, top));
                        break 'search;
                    }
                }
            }
        }

        cells
    }
}

/// Group cells that share at least one corner.  Single-cell groups are not
/// tables.
fn group_cells(cells: Vec<Rect>) -> Vec<Vec<Rect>> {
    let corner_key = |x: f32, y: f32| ((x * 100.0).round() as i64, (y * 100.0).round() as i64);

    // Union-find over cell indices.
    let mut parent: Vec<usize> = (0..cells.len()).collect();
    fn find(parent: &mut [usize], i: usize) -> usize {
        let mut root = i;
        while parent[root] != root {
            root = parent[root];
        }
        let mut node = i;
        while parent[node] != root {
            let next = parent[node];
            parent[node] = root;
            node = next;
        }
        root
    }

    let mut owner: HashMap<(i64, i64), usize> = HashMap::new();
    for (i, cell) in cells.iter().enumerate() {
        let corners = [
            corner_key(cell.x0, cell.y0),
            corner_key(cell.x1, cell.y0),
            corner_key(cell.x0, cell.y1),
            corner_key(cell.x1, cell.y1),
        ];
        for corner in corners {
            match owner.get(&corner) {
                Some(&j) => {
                    let (a, b) = (find(&mut parent, i), find(&mut parent, j));
                    if a != b {
                        parent[a] = b;
                    }
                }
                None => {
                    owner.insert(corner, i);
                }
            }
        }
    }

    let mut groups: BTreeMap<usize, Vec<Rect>> = BTreeMap::new();
    for (i, cell) in cells.iter().enumerate() {
        let root = find(&mut parent, i);
        groups.entry(root).or_default().push(*cell);
    }

    let mut tables: Vec<Vec<Rect>> = groups.into_values().filter(|g| g.len() > 1).collect();
    tables.sort_by(|a, b| {
        let top = |g: &[Rect]| g.iter().map(|c| c.y1).fold(f32::NEG_INFINITY, f32::max);
        top(b)
            .partial_cmp(&top(a))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    tables
}

/// Lay a table's cells out on a row-major grid.
///
/// Rows are the distinct cell tops, columns the distinct cell left edges.
/// A slot with no cell starting there is `None`.
fn table_geometry(cells: &[Rect]) -> TableGeometry {
    let table_bbox = cells
        .iter()
        .skip(1)
        .fold(cells[0], |acc, c| acc.union(c));

    let mut tops: Vec<f32> = cells.iter().map(|c| c.y1).collect();
    tops.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    tops.dedup_by(|a, b| approx_eq(*a, *b));

    let mut lefts: Vec<f32> = cells.iter().map(|c| c.x0).collect();
    lefts.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    lefts.dedup_by(|a, b| approx_eq(*a, *b));

    let mut cell_bboxes = Vec::with_capacity(tops.len() * lefts.len());
    for &top in &tops {
        for &left in &lefts {
            let cell = cells
                .iter()
                .find(|c| approx_eq(c.y1, top) && approx_eq(c.x0, left))
                .copied();
            cell_bboxes.push(cell);
        }
    }

    TableGeometry {
        table_bbox,
        cell_bboxes,
    }
}

// ---------------------------------------------------------------------------
// Text strategy
// ---------------------------------------------------------------------------

/// A single row of aligned spans.
#[derive(Debug, Clone)]
pub struct TableRowData {
    /// Average baseline of the row.
    pub y: f32,
    pub spans: Vec<TextSpan>,
}

/// Tuning knobs for the text-alignment heuristic.
#[derive(Debug, Clone)]
pub struct TableDetectorConfig {
    /// Minimum number of rows required for a region to qualify as a table.
    pub min_rows: usize,
    /// Minimum number of columns required.
    pub min_columns: usize,
    /// Maximum number of columns allowed (guards against noise).
    pub max_columns: usize,
    /// Factor applied to the median font size to derive Y-tolerance when
    /// grouping spans into rows.  `y_tolerance = median_font_size * factor`.
    pub y_tolerance_factor: f32,
    /// Fraction of rows that must have spans aligning with a candidate column
    /// position for that position to be accepted as a column boundary.
    pub min_alignment_ratio: f32,
    /// Minimum horizontal gap (in PDF points) between two adjacent column
    /// boundaries.
    pub min_column_gap: f32,
}

impl Default for TableDetectorConfig {
    fn default() -> Self {
        Self {
            min_rows: 2,
            min_columns: 2,
            max_columns: 20,
            y_tolerance_factor: 0.3,
            min_alignment_ratio: 0.5,
            min_column_gap: 10.0,
        }
    }
}

/// Detect a table from text alignment alone.
///
/// 1. Compute Y-tolerance from the median font size of all spans.
/// 2. Group spans into rows by baseline.
/// 3. Detect column boundaries that appear frequently across rows.
/// 4. If enough rows line up with the columns the region is accepted and
///    laid out as a grid: row bands split halfway between rows, column bands
///    split at the column starts.
pub fn find_tables_from_text(spans: &[TextSpan], config: &TableDetectorConfig) -> Vec<TableGeometry> {
    let spans: Vec<TextSpan> = spans
        .iter()
        .filter(|s| !s.text.trim().is_empty())
        .cloned()
        .collect();
    if spans.is_empty() {
        return Vec::new();
    }

    let y_tolerance = compute_y_tolerance(&spans, config.y_tolerance_factor);
    let rows = group_into_rows(&spans, y_tolerance);
    if rows.len() < config.min_rows {
        return Vec::new();
    }

    let columns = detect_columns(&rows, config);
    if columns.len() < config.min_columns || columns.len() > config.max_columns {
        return Vec::new();
    }

    let aligned_rows = rows
        .iter()
        .filter(|row| {
            let aligned_cols = columns
                .iter()
                .filter(|&&col_x| {
                    row.spans
                        .iter()
                        .any(|s| (s.bbox.x0 - col_x).abs() < config.min_column_gap)
                })
                .count();
            aligned_cols >= columns.len().div_ceil(2)
        })
        .count();

    let ratio = aligned_rows as f32 / rows.len() as f32;
    if ratio < config.min_alignment_ratio {
        return Vec::new();
    }

    let table_bbox = spans
        .iter()
        .skip(1)
        .fold(spans[0].bbox, |acc, s| acc.union(&s.bbox));

    // Row bands, top to bottom.
    let row_extents: Vec<(f32, f32)> = rows
        .iter()
        .map(|row| {
            let top = row.spans.iter().map(|s| s.bbox.y1).fold(f32::NEG_INFINITY, f32::max);
            let bottom = row.spans.iter().map(|s| s.bbox.y0).fold(f32::INFINITY, f32::min);
            (top, bottom)
        })
        .collect();
    let mut row_bounds = vec![table_bbox.y1];
    for pair in row_extents.windows(2) {
        row_bounds.push((pair[0].1 + pair[1].0) / 2.0);
    }
    row_bounds.push(table_bbox.y0);

    // Column bands, left to right.
    let mut col_bounds = columns.clone();
    col_bounds[0] = table_bbox.x0;
    col_bounds.push(table_bbox.x1);

    let mut cell_bboxes = Vec::with_capacity(rows.len() * columns.len());
    for (r, row) in rows.iter().enumerate() {
        let mut occupied = vec![false; columns.len()];
        for span in &row.spans {
            occupied[assign_column(span.bbox.x0, &columns)] = true;
        }
        for (c, filled) in occupied.into_iter().enumerate() {
            cell_bboxes.push(filled.then(|| {
                Rect::new(col_bounds[c], row_bounds[r + 1], col_bounds[c + 1], row_bounds[r])
            }));
        }
    }

    vec![TableGeometry {
        table_bbox,
        cell_bboxes,
    }]
}

/// Group text spans into rows by their baseline.
///
/// Two spans belong to the same row when their baselines differ by no more
/// than `y_tolerance`.  Rows are returned top of page first.
pub fn group_into_rows(spans: &[TextSpan], y_tolerance: f32) -> Vec<TableRowData> {
    if spans.is_empty() {
        return Vec::new();
    }

    let mut sorted: Vec<&TextSpan> = spans.iter().collect();
    sorted.sort_by(|a, b| {
        b.baseline
            .partial_cmp(&a.baseline)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                a.bbox
                    .x0
                    .partial_cmp(&b.bbox.x0)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    });

    let mut rows: Vec<TableRowData> = Vec::new();
    let mut current_y = sorted[0].baseline;
    let mut current_spans: Vec<TextSpan> = Vec::new();

    for span in sorted {
        if (span.baseline - current_y).abs() > y_tolerance && !current_spans.is_empty() {
            rows.push(finish_row(std::mem::take(&mut current_spans)));
            current_y = span.baseline;
        }
        current_spans.push(span.clone());
    }
    if !current_spans.is_empty() {
        rows.push(finish_row(current_spans));
    }

    rows
}

fn finish_row(mut spans: Vec<TextSpan>) -> TableRowData {
    let y = spans.iter().map(|s| s.baseline).sum::<f32>() / spans.len() as f32;
    spans.sort_by(|a, b| {
        a.bbox
            .x0
            .partial_cmp(&b.bbox.x0)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    TableRowData { y, spans }
}

/// Detect column boundaries from a set of table rows.
///
/// Buckets the left edges of all spans, counts how many rows contain a span
/// starting near each bucket, and keeps the positions seen in at least
/// `config.min_alignment_ratio` of the rows.  Positions closer than
/// `config.min_column_gap` collapse onto the leftmost one.
pub fn detect_columns(rows: &[TableRowData], config: &TableDetectorConfig) -> Vec<f32> {
    if rows.is_empty() {
        return Vec::new();
    }

    let mut x_freq: BTreeMap<i32, (f32, usize)> = BTreeMap::new();
    for row in rows {
        // One vote per bucket per row.
        let mut seen_buckets: HashSet<i32> = HashSet::new();
        for span in &row.spans {
            let bucket = span.bbox.x0.round() as i32;
            if seen_buckets.insert(bucket) {
                let entry = x_freq.entry(bucket).or_insert((0.0, 0));
                entry.0 += span.bbox.x0;
                entry.1 += 1;
            }
        }
    }

    let min_count = (rows.len() as f32 * config.min_alignment_ratio).ceil() as usize;
    let mut candidates: Vec<f32> = x_freq
        .values()
        .filter(|(_, count)| *count >= min_count)
        .map(|(sum, count)| sum / *count as f32)
        .collect();
    candidates.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mut columns: Vec<f32> = Vec::new();
    for x in candidates {
        if columns.last().is_some_and(|&last| (x - last).abs() < config.min_column_gap) {
            continue;
        }
        columns.push(x);
    }

    columns
}

/// Median font size times `factor`, never below one point.
fn compute_y_tolerance(spans: &[TextSpan], factor: f32) -> f32 {
    if spans.is_empty() {
        return 1.0;
    }
    let mut sizes: Vec<f32> = spans.iter().map(|s| s.font_size).collect();
    sizes.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let median = sizes[sizes.len() / 2];
    (median * factor).max(1.0)
}

/// Index of the last column starting at or before `x` (tolerating slight
/// misalignment), falling back to the first column.
fn assign_column(x: f32, columns: &[f32]) -> usize {
    columns
        .iter()
        .rposition(|&col| x >= col - 2.0)
        .unwrap_or(0)
}
