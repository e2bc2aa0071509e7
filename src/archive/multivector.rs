use crate::error::{FlatarcError, Result};
use crate::packed::RecordRef;
use crate::schema::RecordLayout;

/// Offset index entry width: one u64 byte offset per logical item.
pub(crate) const OFFSET_SIZE: usize = 8;

/// Read-only view of a multivector: a sequence of logical items, each
/// owning zero or more heterogeneous tagged sub-records in one shared
/// byte stream.
///
/// The region is split in two: an offset index of `len + 1` u64 entries
/// (entry `i` is the byte offset of item `i`'s sub-sequence, the last
/// entry is the total stream length), followed by the data stream of
/// `(tag, packed record)` pairs.
#[derive(Debug, Clone)]
pub struct MultivectorView<'a> {
    name: &'a str,
    index: &'a [u8],
    data: &'a [u8],
    variants: Vec<(u8, &'a RecordLayout)>,
}

impl<'a> MultivectorView<'a> {
    pub(crate) fn new(
        name: &'a str,
        index: &'a [u8],
        data: &'a [u8],
        variants: Vec<(u8, &'a RecordLayout)>,
        count: usize,
    ) -> Result<Self> {
        let needed = count
            .checked_add(1)
            .and_then(|entries| entries.checked_mul(OFFSET_SIZE))
            .ok_or_else(|| {
                FlatarcError::InvalidFormat(format!("multivector {} item count overflows", name))
            })?;
        if index.len() < needed {
            return Err(FlatarcError::Truncated {
                context: format!("multivector {} offset index", name),
                needed,
                available: index.len(),
            });
        }
        let view = Self {
            name,
            index: &index[..needed],
            data,
            variants,
        };
        let total = view.offset_at(count);
        if total != data.len() as u64 {
            return Err(FlatarcError::InvalidFormat(format!(
                "multivector {} offset index ends at {} but stream is {} bytes",
                name,
                total,
                data.len()
            )));
        }
        Ok(view)
    }

    /// Logical item count.
    pub fn len(&self) -> usize {
        self.index.len() / OFFSET_SIZE - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decode the possibly-empty sub-record sequence of item `index`.
    ///
    /// The iterator yields `(tag, record)` pairs; it stops with
    /// [`FlatarcError::UnknownVariant`] on an undeclared tag (the length
    /// of a malformed payload cannot be inferred) and
    /// [`FlatarcError::Truncated`] if a record would overrun the item.
    pub fn item_at(&self, index: usize) -> Result<ItemIter<'a>> {
        if index >= self.len() {
            return Err(FlatarcError::IndexOutOfBounds {
                resource: self.name.to_string(),
                index: index as u64,
                len: self.len() as u64,
            });
        }
        let start = self.offset_at(index);
        let end = self.offset_at(index + 1);
        if start > end || end > self.data.len() as u64 {
            return Err(FlatarcError::InvalidFormat(format!(
                "multivector {} item {} has inverted or overrunning offsets ({}..{})",
                self.name, index, start, end
            )));
        }
        Ok(ItemIter {
            name: self.name.to_string(),
            data: &self.data[start as usize..end as usize],
            cursor: 0,
            variants: self.variants.clone(),
            failed: false,
        })
    }

    fn offset_at(&self, index: usize) -> u64 {
        let bytes = &self.index[index * OFFSET_SIZE..(index + 1) * OFFSET_SIZE];
        u64::from_le_bytes(bytes.try_into().expect("offset entry width"))
    }
}

/// Iterator over the tagged sub-records of one logical item.
pub struct ItemIter<'a> {
    name: String,
    data: &'a [u8],
    cursor: usize,
    variants: Vec<(u8, &'a RecordLayout)>,
    failed: bool,
}

impl<'a> Iterator for ItemIter<'a> {
    type Item = Result<(u8, RecordRef<'a>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.cursor >= self.data.len() {
            return None;
        }

        let tag = self.data[self.cursor];
        let layout = match self.variants.iter().find(|(t, _)| *t == tag) {
            Some((_, layout)) => *layout,
            None => {
                self.failed = true;
                return Some(Err(FlatarcError::UnknownVariant {
                    resource: self.name.clone(),
                    tag,
                }));
            }
        };

        let start = self.cursor + 1;
        let end = start + layout.byte_size();
        if end > self.data.len() {
            self.failed = true;
            return Some(Err(FlatarcError::Truncated {
                context: format!("multivector {} item record", self.name),
                needed: end,
                available: self.data.len(),
            }));
        }

        self.cursor = end;
        Some(Ok((tag, RecordRef::new(&self.data[start..end], layout))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packed::RecordMut;
    use crate::schema::{FieldKind, RecordLayout};

    fn member_layout() -> RecordLayout {
        RecordLayout::packed(
            "WayMember",
            &[
                ("way_idx", FieldKind::Unsigned, 32),
                ("role_idx", FieldKind::Unsigned, 32),
            ],
        )
    }

    fn offsets(entries: &[u64]) -> Vec<u8> {
        entries.iter().flat_map(|o| o.to_le_bytes()).collect()
    }

    #[test]
    fn test_item_decoding_and_empty_item() {
        let layout = member_layout();
        let size = layout.byte_size();

        // Item 0: one tagged record; item 1: empty
        let mut data = vec![0u8];
        data.resize(1 + size, 0);
        {
            let mut rec = RecordMut::new(&mut data[1..], &layout);
            rec.set("way_idx", 1).unwrap();
            rec.set("role_idx", 0).unwrap();
        }
        let index = offsets(&[0, (1 + size) as u64, (1 + size) as u64]);

        let view =
            MultivectorView::new("members", &index, &data, vec![(0, &layout)], 2).unwrap();
        assert_eq!(view.len(), 2);

        let items: Vec<(u8, u64)> = view
            .item_at(0)
            .unwrap()
            .map(|r| {
                let (tag, rec) = r.unwrap();
                (tag, rec.get_u64("way_idx").unwrap())
            })
            .collect();
        assert_eq!(items, vec![(0, 1)]);

        assert_eq!(view.item_at(1).unwrap().count(), 0);
        assert!(view.item_at(2).is_err());
    }

    #[test]
    fn test_unknown_tag_is_an_error() {
        let layout = member_layout();
        let size = layout.byte_size();
        let mut data = vec![9u8]; // undeclared tag
        data.resize(1 + size, 0);
        let index = offsets(&[0, (1 + size) as u64]);

        let view =
            MultivectorView::new("members", &index, &data, vec![(0, &layout)], 1).unwrap();
        let mut iter = view.item_at(0).unwrap();
        assert!(matches!(
            iter.next().unwrap(),
            Err(FlatarcError::UnknownVariant { tag: 9, .. })
        ));
        // Decoding stops after the failure
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_truncated_record_is_an_error() {
        let layout = member_layout();
        // Tag byte followed by too few record bytes
        let data = vec![0u8; 4];
        let index = offsets(&[0, 4]);

        let view =
            MultivectorView::new("members", &index, &data, vec![(0, &layout)], 1).unwrap();
        let mut iter = view.item_at(0).unwrap();
        assert!(matches!(
            iter.next().unwrap(),
            Err(FlatarcError::Truncated { .. })
        ));
    }

    #[test]
    fn test_index_must_cover_stream() {
        let layout = member_layout();
        let data = vec![0u8; 10];
        let index = offsets(&[0, 4]); // claims 4 bytes, stream has 10

        let result = MultivectorView::new("members", &index, &data, vec![(0, &layout)], 1);
        assert!(matches!(result, Err(FlatarcError::InvalidFormat(_))));
    }
}
