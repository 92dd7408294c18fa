pub mod scopedmap;
