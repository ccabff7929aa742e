/// Units which are simply type aliases for `f32` rather than having an
/// implementation as a `uom` `Quantity`.
///
/// This may be because:
///
/// + The value crosses into a device buffer, where only plain `f32`s exist.
///
/// + The value lives in the innermost projection loops, where we keep to
///   plain `f32`s in millimetres, but still want some clues in the source as
///   to what they represent.

pub type Lengthf32    = f32;
pub type Weightf32    = f32; // Intersection length of a LOR with a voxel, in mm
pub type Ratiof32     = f32;
pub type Intensityf32 = f32; // TODO uom Intensity
