use bytemuck::{Pod, Zeroable};

// shared verbatim with every kernel, so the field order and widths are fixed.
// only 32 bit floats and uints -> no padding anywhere (Pod would refuse to derive otherwise)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct SimulationParams {
    pub particle_radius: f32,
    pub particle_mass: f32,
    pub rest_density: f32,
    pub boundary_count: u32,
    pub fluid_count: u32,

    pub kernel_radius: f32,
    pub kernel_radius2: f32,

    pub bucket_count: u32,
    pub cell_size: f32,

    pub poly6_normalization: f32,
    pub poly6_d1_normalization: f32,
    pub viscosity_d2_normalization: f32,
    pub spiky_d1_normalization: f32,
    pub surface_tension_coefficient: f32,
    pub surface_tension_term: f32,
    pub surface_tension_normalization: f32,

    pub viscosity_constant: f32,
    pub gravity: f32,
    pub delta_t: f32,

    pub density_variation_scaling_factor: f32,
}

pub const PARAMS_BLOCK_SIZE: usize = std::mem::size_of::<SimulationParams>();

/// The flat memory image of [`SimulationParams`] as it is handed to a dispatch.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParamsBlock([u8; PARAMS_BLOCK_SIZE]);

impl ParamsBlock {
    pub fn new(params: &SimulationParams) -> Self {
        let mut bytes = [0u8; PARAMS_BLOCK_SIZE];
        bytes.copy_from_slice(bytemuck::bytes_of(params));
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    // kernels read the block back without caring about alignment
    pub fn decode(&self) -> SimulationParams {
        bytemuck::pod_read_unaligned(&self.0)
    }
}
