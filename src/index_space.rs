use core::ops::Range;




/**
 * Identifier for a Cartesian axis
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    I,
    J,
    K,
}




#[derive(Clone, Debug, PartialEq, Eq)]


/**
 * Represents a box-shaped region in a discrete 3D index space. Indexes
 * count cells at a given refinement level, measured from the lower corner
 * of the domain.
 */
pub struct IndexSpace {
    di: Range<i64>,
    dj: Range<i64>,
    dk: Range<i64>,
}




// ============================================================================
impl IndexSpace {


    pub fn new(di: Range<i64>, dj: Range<i64>, dk: Range<i64>) -> Self {

        assert!(
            di.start <= di.end && dj.start <= dj.end && dk.start <= dk.end,
            "index space has negative volume");

        Self { di, dj, dk }
    }


    /**
     * Return the number of indexes on each axis.
     */
    pub fn dim(&self) -> (usize, usize, usize) {
        ((self.di.end - self.di.start) as usize,
         (self.dj.end - self.dj.start) as usize,
         (self.dk.end - self.dk.start) as usize)
    }


    /**
     * Return the number of elements in this index space.
     */
    pub fn len(&self) -> usize {
        let (l, m, n) = self.dim();
        l * m * n
    }


    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }


    /**
     * Return the index range along one axis.
     */
    pub fn range(&self, axis: Axis) -> &Range<i64> {
        match axis {
            Axis::I => &self.di,
            Axis::J => &self.dj,
            Axis::K => &self.dk,
        }
    }


    /**
     * Determine whether this index space contains the given index.
     */
    pub fn contains(&self, index: (i64, i64, i64)) -> bool {
        self.di.contains(&index.0) && self.dj.contains(&index.1) && self.dk.contains(&index.2)
    }


    /**
     * Return the overlap of two index spaces, or `None` if they are
     * disjoint. Spaces that only touch at a face do not overlap.
     */
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        let di = self.di.start.max(other.di.start)..self.di.end.min(other.di.end);
        let dj = self.dj.start.max(other.dj.start)..self.dj.end.min(other.dj.end);
        let dk = self.dk.start.max(other.dk.start)..self.dk.end.min(other.dk.end);

        if di.start < di.end && dj.start < dj.end && dk.start < dk.end {
            Some(Self { di, dj, dk })
        } else {
            None
        }
    }


    /**
     * Return the linear offset for the given index, in a row-major memory
     * buffer aligned with the start of this index space.
     */
    pub fn row_major_offset(&self, index: (i64, i64, i64)) -> usize {
        let (_, m, n) = self.dim();
        let i = (index.0 - self.di.start) as usize;
        let j = (index.1 - self.dj.start) as usize;
        let k = (index.2 - self.dk.start) as usize;
        (i * m + j) * n + k
    }


    /**
     * Return an iterator which traverses the index space in row-major order
     * (C-like; the final index increases fastest).
     */
    pub fn iter(&self) -> impl Iterator<Item = (i64, i64, i64)> + '_ {
        self.di.clone().flat_map(move |i| {
            self.dj.clone().flat_map(move |j| self.dk.clone().map(move |k| (i, j, k)))
        })
    }
}




/**
 * Less imposing factory function to construct an IndexSpace object.
 */
pub fn range3d(di: Range<i64>, dj: Range<i64>, dk: Range<i64>) -> IndexSpace {
    IndexSpace::new(di, dj, dk)
}
