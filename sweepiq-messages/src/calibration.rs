use crate::FftBatch;

/// Fixed power offset learned from a reference measurement.
///
/// The offset is referenced to the gain the measurement was taken at; a
/// different receiver gain shifts it by the gain difference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerCalibration {
    pub offset_db: f32,
    pub gain_db: f32,
}

impl PowerCalibration {
    pub fn new(expected_dbm: f32, measured_dbm: f32, measured_at_gain_db: f32) -> Self {
        Self {
            offset_db: expected_dbm - measured_dbm,
            gain_db: measured_at_gain_db,
        }
    }

    pub fn offset_at(&self, gain_db: f32) -> f32 {
        self.offset_db + (self.gain_db - gain_db)
    }

    pub fn correct(&self, gain_db: f32, batch: &mut FftBatch) {
        let offset = self.offset_at(gain_db);
        batch.power_dbm.iter_mut().for_each(|p| *p += offset);
    }
}
