#![cfg(feature = "local-model")]

use candle_core::{Device, Tensor};
use docqa_embed::local::masked_mean_l2;

#[test]
fn masked_mean_ignores_padding_and_normalises() {
    let device = Device::Cpu;
    // [1, 3, 2]: the third position is padding and must not contribute.
    let hidden = Tensor::new(&[[[3f32, 0.0], [1.0, 0.0], [100.0, 100.0]]], &device).unwrap();
    let mask = Tensor::new(&[[1u32, 1, 0]], &device).unwrap();
    let pooled = masked_mean_l2(&hidden, &mask).unwrap();
    assert_eq!(pooled.dims(), &[1, 2]);
    let row: Vec<f32> = pooled.squeeze(0).unwrap().to_vec1().unwrap();
    assert!((row[0] - 1.0).abs() < 1e-5);
    assert!(row[1].abs() < 1e-5);
}

#[test]
fn rows_are_unit_length() {
    let device = Device::Cpu;
    let hidden = Tensor::new(&[[[1f32, 2.0, 2.0], [0.0, 0.0, 0.0]], [[4.0, 0.0, 3.0], [4.0, 0.0, 3.0]]], &device).unwrap();
    let mask = Tensor::new(&[[1u32, 0], [1, 1]], &device).unwrap();
    let pooled = masked_mean_l2(&hidden, &mask).unwrap();
    for row in pooled.to_vec2::<f32>().unwrap() {
        let norm: f32 = row.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }
}
