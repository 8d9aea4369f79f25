use std::collections::BTreeMap;

/// Sparse 2-D grid keyed by tile-local pixel `x`, then `y`.
///
/// Keys may be negative or past the tile edge: listings just outside a tile
/// still land on its grid so they can influence pixels near the border.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelGrid<T> {
    columns: BTreeMap<i64, BTreeMap<i64, T>>,
}

impl<T> Default for PixelGrid<T> {
    fn default() -> Self {
        Self {
            columns: BTreeMap::new(),
        }
    }
}

impl<T> PixelGrid<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, x: i64, y: i64) -> Option<&T> {
        self.columns.get(&x)?.get(&y)
    }

    pub fn insert(&mut self, x: i64, y: i64, value: T) -> Option<T> {
        self.columns.entry(x).or_default().insert(y, value)
    }

    pub fn get_or_insert_with(&mut self, x: i64, y: i64, make: impl FnOnce() -> T) -> &mut T {
        self.columns.entry(x).or_default().entry(y).or_insert_with(make)
    }

    pub fn column(&self, x: i64) -> Option<&BTreeMap<i64, T>> {
        self.columns.get(&x)
    }

    /// Populated cells in `(x, y)` order.
    pub fn iter(&self) -> impl Iterator<Item = (i64, i64, &T)> {
        self.columns
            .iter()
            .flat_map(|(&x, column)| column.iter().map(move |(&y, value)| (x, y, value)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (i64, i64, &mut T)> {
        self.columns
            .iter_mut()
            .flat_map(|(&x, column)| column.iter_mut().map(move |(&y, value)| (x, y, value)))
    }

    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> PixelGrid<U> {
        let columns = self
            .columns
            .into_iter()
            .map(|(x, column)| (x, column.into_iter().map(|(y, v)| (y, f(v))).collect()))
            .collect();
        PixelGrid { columns }
    }

    /// Number of populated cells.
    pub fn len(&self) -> usize {
        self.columns.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.values().all(BTreeMap::is_empty)
    }
}

/// Accumulated Gaussian contribution at one pixel.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct WeightedValue {
    pub value: f64,
    pub weight: f64,
}
