mod value;
mod handle;
mod header;
mod objects;
mod layout;
mod verify;

pub use value::{Value, WORD_SIZE};
pub use handle::Tagged;
pub use header::{Header, HeaderFlags, ObjectType};
pub use objects::{
    Map, init_map,
    FixedArray, fixed_array_allocation_size, init_fixed_array,
    SloppyArgumentsElements, Context,
    JsFunction, init_function,
    Oddball, OddballKind, init_oddball,
    IndexedObject, SloppyArgumentsObject,
};
pub use layout::{object_size, trace_object};
pub use verify::{referent_type, verify_object};

#[cfg(test)]
mod tests {
    use super::*;

    /// Word-aligned scratch memory for building objects by hand.
    struct Scratch(Vec<u64>);

    impl Scratch {
        fn new(words: usize) -> Self {
            Self(vec![0; words])
        }

        fn at<T>(&mut self, word: usize) -> *mut T {
            assert!(word < self.0.len());
            unsafe { self.0.as_mut_ptr().add(word) as *mut T }
        }
    }

    // ── Value tagging ──────────────────────────────────────────────

    #[test]
    fn fixnum_round_trip() {
        for &n in &[0i64, 1, -1, 42, -42, (1 << 62) - 1, -(1 << 62)] {
            let v = Value::from_i64(n);
            assert!(v.is_fixnum());
            assert!(!v.is_ref());
            assert!(!v.is_header());
            assert_eq!(unsafe { v.to_i64() }, n);
            assert_eq!(v.as_fixnum(), Some(n));
        }
    }

    #[test]
    fn zero_word_is_fixnum_zero() {
        let v = Value::zero();
        assert_eq!(v.raw(), 0);
        assert_eq!(v, Value::from_usize(0));
        assert!(!v.is_ref());
    }

    #[test]
    fn ref_tagging() {
        let dummy: u64 = 0;
        let ptr = &dummy as *const u64;
        let v = Value::from_ptr(ptr);
        assert!(v.is_ref());
        assert!(!v.is_fixnum());
        assert!(!v.is_header());
        assert_eq!(v.ref_bits(), ptr as u64);
        assert_eq!(v.as_fixnum(), None);
    }

    #[test]
    fn header_tag_detected() {
        let hdr = Header::new(ObjectType::FixedArray);
        let raw = unsafe { *((&hdr) as *const Header as *const u64) };
        let v = Value::from_raw(raw);
        assert!(v.is_header());
        assert!(!v.is_fixnum());
        assert!(!v.is_ref());
    }

    // ── Tagged ─────────────────────────────────────────────────────

    #[test]
    fn handle_ref_round_trip() {
        let data: u64 = 0xCAFE;
        let h = Tagged::<u64>::from_ptr(&data);
        assert!(h.is_ref());
        assert_eq!(h.as_ptr() as *const u64, &data as *const u64);
        unsafe {
            assert_eq!(*h.as_ref(), 0xCAFE);
        }
        let v: Value = h.into();
        assert_eq!(Tagged::<u64>::from(v), h);
    }

    // ── Header ─────────────────────────────────────────────────────

    #[test]
    fn header_object_type() {
        for raw in 0..ObjectType::COUNT as u8 {
            let ty = ObjectType::from_u8(raw).unwrap();
            let h = Header::new(ty);
            assert!(h.is_initialized());
            assert_eq!(h.object_type(), ty);
            assert_eq!(h.try_object_type(), Some(ty));
        }
        assert_eq!(ObjectType::from_u8(ObjectType::COUNT as u8), None);
    }

    #[test]
    fn zeroed_header_is_uninitialized() {
        let mut scratch = Scratch::new(1);
        let h = unsafe { &*scratch.at::<Header>(0) };
        assert!(!h.is_initialized());
        assert_eq!(h.try_object_type(), None);
    }

    #[test]
    fn header_flags() {
        let h = Header::new(ObjectType::Oddball);
        assert!(!h.has_flag(HeaderFlags::READ_ONLY));
        assert_eq!(h.flags(), HeaderFlags::empty());

        h.add_flag(HeaderFlags::READ_ONLY);
        assert!(h.has_flag(HeaderFlags::READ_ONLY));
        // flags leave the type byte alone
        assert_eq!(h.object_type(), ObjectType::Oddball);
    }

    // ── Layout ─────────────────────────────────────────────────────

    #[test]
    fn fixed_array_allocation_sizes() {
        assert_eq!(FixedArray::HEADER_SIZE, 24);
        assert_eq!(fixed_array_allocation_size(0), 24);
        assert_eq!(fixed_array_allocation_size(3), 24 + 3 * 8);
        assert_eq!(FixedArray::offset_of_element_at(2), 40);
    }

    #[test]
    fn context_parameters_are_reversed() {
        assert_eq!(Context::parameter_slot(2, 0), 3);
        assert_eq!(Context::parameter_slot(2, 1), 2);
        assert_eq!(Context::parameter_slot(1, 0), Context::MIN_SLOTS);
    }

    /// A self-describing map, a FixedArray map and a two element array.
    fn tiny_heap(scratch: &mut Scratch) -> (*mut Map, *mut Map, *mut FixedArray) {
        let map_map = scratch.at::<Map>(0);
        let array_map = scratch.at::<Map>(5);
        let array = scratch.at::<FixedArray>(10);
        unsafe {
            let self_ref = Value::from_ptr(map_map);
            init_map(map_map, self_ref, ObjectType::Map, Map::SIZE, Value::zero());
            init_map(array_map, self_ref, ObjectType::FixedArray, 0, Value::zero());
            init_fixed_array(array, ObjectType::FixedArray, Value::from_ptr(array_map), 2);
            (*array).set(0, Value::from_i64(7));
            (*array).set(1, Value::from_ptr(array_map));
        }
        (map_map, array_map, array)
    }

    #[test]
    fn object_size_follows_header() {
        let mut scratch = Scratch::new(16);
        let (map_map, _, array) = tiny_heap(&mut scratch);
        unsafe {
            assert_eq!(object_size(map_map as *const u8), Map::SIZE);
            assert_eq!(object_size(array as *const u8), fixed_array_allocation_size(2));
            assert_eq!((*array).get(1).map(|v| v.is_ref()), Some(true));
            assert_eq!((*array).get(2), None);
        }

        let mut empty = Scratch::new(4);
        assert_eq!(unsafe { object_size(empty.at::<u8>(0)) }, 0);
    }

    #[test]
    fn trace_visits_reference_slots() {
        let mut scratch = Scratch::new(16);
        let (_, array_map, array) = tiny_heap(&mut scratch);
        let mut refs = Vec::new();
        unsafe {
            trace_object(array as *const u8, &mut |v| {
                if v.is_ref() {
                    refs.push(v.ref_bits());
                }
            });
        }
        assert_eq!(refs, vec![array_map as u64, array_map as u64]);
    }

    #[test]
    fn verify_accepts_well_formed_objects() {
        let mut scratch = Scratch::new(16);
        let (map_map, array_map, array) = tiny_heap(&mut scratch);
        unsafe {
            assert_eq!(verify_object(map_map as *const u8), Ok(()));
            assert_eq!(verify_object(array_map as *const u8), Ok(()));
            assert_eq!(verify_object(array as *const u8), Ok(()));
        }
    }

    #[test]
    fn verify_rejects_unwritten_map() {
        let mut scratch = Scratch::new(16);
        let (_, _, array) = tiny_heap(&mut scratch);
        unsafe {
            (*array).map = Value::zero();
            assert_eq!(verify_object(array as *const u8), Err("map is not a Map"));
        }
    }

    #[test]
    fn verify_rejects_mismatched_map() {
        let mut scratch = Scratch::new(16);
        let (map_map, _, array) = tiny_heap(&mut scratch);
        unsafe {
            (*array).map = Value::from_ptr(map_map);
            assert_eq!(
                verify_object(array as *const u8),
                Err("map instance type does not match header")
            );
        }
    }
}
