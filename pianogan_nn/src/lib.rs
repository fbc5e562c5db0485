// Neural-network layers for the piano GAN.
//
// A deliberately small, CPU-only library: each layer implements its own
// forward and backward pass over `ndarray` tensors, and a `Sequential`
// model chains them. There is no autograd tape; backpropagation is the
// reverse walk over the layer stack, with each layer caching exactly what
// its own gradient needs.
//
// Architecture:
// - layer.rs: `Layer` enum, `Mode`, `Param`, reshape and shape helpers
// - dense.rs: fully connected layer
// - activation.rs: leaky ReLU, tanh, sigmoid
// - batch_norm.rs: batch normalization with running statistics
// - lstm.rs: LSTM with backpropagation through time, bidirectional wrapper
// - model.rs: `Sequential` stack, summary, bincode persistence
// - optim.rs: Adam
// - loss.rs: binary cross-entropy and accuracy
// - init.rs: Glorot-uniform initialization from a seeded `Prng`
//
// Everything random takes a `&mut Prng`, so a model built from a given seed
// is bit-for-bit reproducible.

pub mod activation;
pub mod batch_norm;
pub mod dense;
pub mod error;
pub mod init;
pub mod layer;
pub mod loss;
pub mod lstm;
pub mod model;
pub mod optim;

#[cfg(test)]
mod testutil;

pub use error::NnError;
pub use layer::{Layer, Mode, Param};
pub use model::Sequential;
pub use optim::{Adam, AdamConfig};
