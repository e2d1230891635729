//! The APU's view of the rest of the console.

/// Host-side services the APU needs: memory peeks for sample hashing, the
/// DMC's DMA request line and the IRQ line.
///
/// Every APU entry point that can touch one of these takes the bus as an
/// argument, so the APU holds no reference to its host.
pub trait ApuBus {
    /// Side-effect free memory read.
    fn read_debugger(&mut self, addr: u16) -> u8;

    /// Ask the host to fetch the next DMC byte. The byte comes back later
    /// through `Apu::set_dma_buffer`, read from `Apu::dmc_dma_address`.
    fn dmc_dma_pending(&mut self);

    /// Level of the APU's IRQ output (frame or DMC interrupt pending).
    fn apu_line(&mut self, asserted: bool);

    /// Value left on the data bus, returned for unmapped reads.
    fn open_bus(&self) -> u8 {
        0
    }
}

/// Flat 64 KiB memory with DMA servicing and IRQ tracing, for tests and
/// headless drivers.
#[derive(Debug, Clone)]
pub struct MemoryBus {
    pub memory: Vec<u8>,
    /// Outstanding DMA requests
    pub dma_requests: u32,
    pub irq: bool,
    /// Every IRQ level the APU has driven, in order
    pub irq_history: Vec<bool>,
    pub open_bus: u8,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self {
            memory: vec![0; 0x10000],
            dma_requests: 0,
            irq: false,
            irq_history: Vec::new(),
            open_bus: 0,
        }
    }

    /// Copy `data` into memory starting at `addr`, wrapping at the top.
    pub fn load(&mut self, addr: u16, data: &[u8]) {
        for (i, &byte) in data.iter().enumerate() {
            let a = addr.wrapping_add(i as u16) as usize;
            self.memory[a] = byte;
        }
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ApuBus for MemoryBus {
    fn read_debugger(&mut self, addr: u16) -> u8 {
        self.memory[addr as usize]
    }

    fn dmc_dma_pending(&mut self) {
        self.dma_requests += 1;
    }

    fn apu_line(&mut self, asserted: bool) {
        self.irq = asserted;
        self.irq_history.push(asserted);
    }

    fn open_bus(&self) -> u8 {
        self.open_bus
    }
}
